//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, route
//! decision, dispatch to the file server, and the final header pass.

use crate::config::AppState;
use crate::handler::static_files::StaticFiles;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use crate::routing::{self, RouteDecision};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_modified_since: Option<&'a str>,
}

/// Routes requests and stamps every response with the no-cache headers
#[derive(Debug, Clone)]
pub struct Router {
    files: StaticFiles,
    server_name: String,
}

impl Router {
    pub const fn new(root: PathBuf, server_name: String) -> Self {
        Self {
            files: StaticFiles::new(root),
            server_name,
        }
    }

    pub fn root(&self) -> &Path {
        self.files.root()
    }

    /// Produce the complete response for a request
    pub async fn respond<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let mut response = self.dispatch(req).await;
        http::apply_default_headers(response.headers_mut(), &self.server_name);
        // Must run last so nothing above can override it
        http::apply_no_cache(response.headers_mut());
        response
    }

    async fn dispatch<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let method = req.method();
        if method != Method::GET && method != Method::HEAD {
            logger::log_debug(&format!("Unsupported method: {method}"));
            return http::build_501_response(method);
        }

        let ctx = RequestContext {
            path: req.uri().path(),
            query: req.uri().query(),
            is_head: method == Method::HEAD,
            // If-None-Match takes precedence, and no ETag is ever sent to match it
            if_modified_since: if req.headers().contains_key(IF_NONE_MATCH) {
                None
            } else {
                req.headers()
                    .get(IF_MODIFIED_SINCE)
                    .and_then(|v| v.to_str().ok())
            },
        };

        let decision: RouteDecision = routing::decide(ctx.path);
        if let Some((status, location)) = decision.redirect() {
            return http::build_redirect_response(status, location);
        }

        let path = decision.rewritten_path().unwrap_or(ctx.path);
        if path != ctx.path {
            logger::log_debug(&format!("Rewrite {} -> {path}", decision.requested_path));
        }
        self.files.serve(&ctx, path).await
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    // GET and HEAD carry no body worth reading
    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, ());
    let response = state.router.respond(&req).await;

    if state.access_log {
        let entry = access_log_entry(&req, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn access_log_entry<B>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let header = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version()).to_string();
    entry.status = response.status().as_u16();
    let body_bytes = response.body().size_hint().exact().unwrap_or(0);
    entry.body_bytes = usize::try_from(body_bytes).unwrap_or(usize::MAX);
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

fn version_label(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "1.0"
    } else if version == Version::HTTP_09 {
        "0.9"
    } else if version == Version::HTTP_2 {
        "2"
    } else {
        "1.1"
    }
}
