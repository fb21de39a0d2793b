//! Response header injection
//!
//! Every response leaves the server with caching disabled. The no-cache
//! headers are applied after all other headers and replace any existing
//! value, so nothing set earlier can weaken them.

use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, DATE, EXPIRES, PRAGMA, SERVER};

pub const NO_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
pub const NO_CACHE_PRAGMA: &str = "no-cache";
pub const NO_CACHE_EXPIRES: &str = "0";

/// Force `Cache-Control`, `Pragma` and `Expires` to their no-cache values
pub fn apply_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
    headers.insert(PRAGMA, HeaderValue::from_static(NO_CACHE_PRAGMA));
    headers.insert(EXPIRES, HeaderValue::from_static(NO_CACHE_EXPIRES));
}

/// Add `Server` and `Date` unless the response already carries them
pub fn apply_default_headers(headers: &mut HeaderMap, server_name: &str) {
    if !headers.contains_key(SERVER) {
        match HeaderValue::from_str(server_name) {
            Ok(value) => {
                headers.insert(SERVER, value);
            }
            Err(_) => crate::logger::log_warning(&format!(
                "Invalid server name header: {server_name:?}"
            )),
        }
    }
    if !headers.contains_key(DATE) {
        let now = super::cache::format_http_date(chrono::Utc::now());
        if let Ok(value) = HeaderValue::from_str(&now) {
            headers.insert(DATE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_no_cache_on_empty() {
        let mut headers = HeaderMap::new();
        apply_no_cache(&mut headers);
        assert_eq!(headers[CACHE_CONTROL], NO_CACHE_CONTROL);
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
    }

    #[test]
    fn test_apply_no_cache_replaces_existing() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static("immutable"));
        headers.insert(EXPIRES, HeaderValue::from_static("Thu, 01 Jan 2099 00:00:00 GMT"));

        apply_no_cache(&mut headers);

        let values: Vec<_> = headers.get_all(CACHE_CONTROL).iter().collect();
        assert_eq!(values, vec![NO_CACHE_CONTROL]);
        assert_eq!(headers.get_all(EXPIRES).iter().count(), 1);
        assert_eq!(headers[EXPIRES], "0");
    }

    #[test]
    fn test_default_headers_do_not_override() {
        let mut headers = HeaderMap::new();
        headers.insert(SERVER, HeaderValue::from_static("custom"));
        apply_default_headers(&mut headers, "nocache-server/0.1.0");
        assert_eq!(headers[SERVER], "custom");
        assert!(headers[DATE].to_str().unwrap().ends_with(" GMT"));
    }
}
