//! Route matching module
//!
//! Applies the fixed route table to a request path and produces the
//! per-request [`RouteDecision`].

use hyper::StatusCode;

/// What to do with a request once the route table has been consulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Hand the request path to the file server unchanged
    Passthrough,
    /// Serve this path (relative to the served root) instead
    Rewrite(&'static str),
    /// Answer with a redirect and never touch the filesystem
    Redirect {
        status: StatusCode,
        location: &'static str,
    },
}

/// Outcome of routing a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub requested_path: String,
    pub action: RouteAction,
}

impl RouteDecision {
    /// Path to serve if the route rewrote it
    pub const fn rewritten_path(&self) -> Option<&'static str> {
        match self.action {
            RouteAction::Rewrite(path) => Some(path),
            _ => None,
        }
    }

    /// Redirect status and location if the route redirects
    pub const fn redirect(&self) -> Option<(StatusCode, &'static str)> {
        match self.action {
            RouteAction::Redirect { status, location } => Some((status, location)),
            _ => None,
        }
    }
}

/// A single exact-match entry of the route table
struct Route {
    paths: &'static [&'static str],
    action: RouteAction,
}

/// Route table, evaluated in order; the first exact match wins
const ROUTES: &[Route] = &[
    Route {
        paths: &["/new", "/new/"],
        action: RouteAction::Rewrite("/index.html"),
    },
    Route {
        paths: &["/old", "/old/"],
        action: RouteAction::Rewrite("/index-old.html"),
    },
    Route {
        paths: &["/"],
        action: RouteAction::Redirect {
            status: StatusCode::FOUND,
            location: "/new",
        },
    },
];

/// Route a request path
///
/// `path` is the URI path without the query string. Anything not in the
/// table passes through untouched.
pub fn decide(path: &str) -> RouteDecision {
    let action = ROUTES
        .iter()
        .find(|route| route.paths.iter().any(|p| *p == path))
        .map_or(RouteAction::Passthrough, |route| route.action.clone());

    RouteDecision {
        requested_path: path.to_string(),
        action,
    }
}
