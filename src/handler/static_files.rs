//! Static file serving module
//!
//! The file-serving side of the server: maps a URL path onto the served
//! directory and answers with the file, a directory index or listing, a
//! trailing-slash redirect, or a 404.

use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Files tried, in order, when a directory is requested
const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// Characters left unescaped in listing links
const LINK_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// File-serving capability rooted at one directory
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL path onto the filesystem under the served root
    ///
    /// The path is percent-decoded and normalized; `.` and empty segments
    /// are dropped and `..` never climbs above the root.
    pub fn translate_path(&self, url_path: &str) -> PathBuf {
        let path = url_path.split(['?', '#']).next().unwrap_or_default();
        let decoded = percent_decode_str(path).decode_utf8_lossy();

        let mut segments: Vec<&str> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s if s.contains(std::path::MAIN_SEPARATOR) => {}
                s => segments.push(s),
            }
        }

        segments
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Serve `path` (the request path, possibly rewritten by the router)
    pub async fn serve(&self, ctx: &RequestContext<'_>, path: &str) -> Response<Full<Bytes>> {
        let fs_path = self.translate_path(path);
        let trailing_slash = path.ends_with('/');

        if fs::metadata(&fs_path).await.is_ok_and(|m| m.is_dir()) {
            if !trailing_slash {
                let location = match ctx.query {
                    Some(q) => format!("{path}/?{q}"),
                    None => format!("{path}/"),
                };
                return http::build_redirect_response(StatusCode::MOVED_PERMANENTLY, &location);
            }
            return match find_index(&fs_path).await {
                Some(index) => serve_file(ctx, &index).await,
                None => serve_listing(ctx, &fs_path, path).await,
            };
        }

        if trailing_slash {
            return http::build_404_response(ctx.is_head);
        }

        serve_file(ctx, &fs_path).await
    }
}

async fn find_index(dir: &Path) -> Option<PathBuf> {
    for name in INDEX_FILES {
        let candidate = dir.join(name);
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Some(candidate);
        }
    }
    None
}

/// Serve a single file, honoring `If-Modified-Since`
async fn serve_file(ctx: &RequestContext<'_>, file_path: &Path) -> Response<Full<Bytes>> {
    let metadata = match fs::metadata(file_path).await {
        Ok(m) if m.is_file() => m,
        // Missing and non-regular files are a plain 404
        _ => return http::build_404_response(ctx.is_head),
    };

    let modified = metadata.modified().ok();
    let last_modified = modified.map(cache::last_modified).unwrap_or_default();

    if let Some(modified) = modified {
        if cache::check_not_modified(ctx.if_modified_since, modified) {
            return http::build_304_response(&last_modified);
        }
    }

    let content = match fs::read(file_path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_warning(&format!(
                "Failed to read file '{}': {e}",
                file_path.display()
            ));
            return http::build_404_response(ctx.is_head);
        }
    };

    let content_type = mime::content_type_for(file_path);
    http::build_file_response(content, content_type, &last_modified, ctx.is_head)
}

async fn serve_listing(
    ctx: &RequestContext<'_>,
    dir: &Path,
    url_path: &str,
) -> Response<Full<Bytes>> {
    match list_directory(dir, url_path).await {
        Ok(html) => http::build_html_response(html, ctx.is_head),
        Err(e) => {
            logger::log_warning(&format!("Cannot list directory '{}': {e}", dir.display()));
            let message = "No permission to list directory";
            http::build_error_response(StatusCode::NOT_FOUND, message, ctx.is_head)
        }
    }
}

/// Render an HTML index of `dir`, titled with the decoded `url_path`
pub async fn list_directory(dir: &Path, url_path: &str) -> std::io::Result<String> {
    let mut entries = Vec::new();
    let mut reader = fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_symlink = entry.file_type().await.is_ok_and(|t| t.is_symlink());
        // Follows symlinks, so a link to a directory counts as one
        let is_dir = fs::metadata(entry.path()).await.is_ok_and(|m| m.is_dir());
        entries.push((name, is_dir, is_symlink));
    }
    entries.sort_by_key(|(name, _, _)| name.to_lowercase());

    let path_only = url_path.split(['?', '#']).next().unwrap_or_default();
    let display_path = http::escape_html(&percent_decode_str(path_only).decode_utf8_lossy());
    let title = format!("Directory listing for {display_path}");

    let mut html = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"
    );
    for (name, is_dir, is_symlink) in &entries {
        let display = match (*is_symlink, *is_dir) {
            (true, _) => format!("{name}@"),
            (false, true) => format!("{name}/"),
            (false, false) => name.clone(),
        };
        // Links to directories still get the trailing slash
        let link = if *is_dir { format!("{name}/") } else { name.clone() };
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            utf8_percent_encode(&link, LINK_SAFE),
            http::escape_html(&display)
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    Ok(html)
}
