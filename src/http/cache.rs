//! Conditional request module
//!
//! HTTP-date formatting and `If-Modified-Since` evaluation. Responses are
//! still marked no-cache; this only lets a client that sends a validator
//! anyway get a `304` instead of the full body.

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP-date header value
///
/// Returns `None` for anything that isn't a valid date, in which case the
/// header is ignored.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `Last-Modified` value for a file modification time
pub fn last_modified(modified: SystemTime) -> String {
    format_http_date(DateTime::<Utc>::from(modified))
}

/// Check whether the client's copy is still current
///
/// Compares at second precision since HTTP-dates carry no fractions.
pub fn check_not_modified(if_modified_since: Option<&str>, modified: SystemTime) -> bool {
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}
