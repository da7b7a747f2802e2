//! Conditional request evaluation (If-None-Match / If-Modified-Since).
//!
//! Runs against every outgoing response that carries validators, not only
//! static files, so API handlers that stamp an ETag get 304s for free.

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use chrono::{DateTime, Utc};

/// Rewrites `resp` in place if the client's cached copy is still current.
///
/// A current copy becomes `304 Not Modified` for GET/HEAD (validators kept,
/// body dropped) and `412 Precondition Failed` for other methods. If-None-Match
/// takes precedence over If-Modified-Since, per RFC 7232.
pub fn apply(req: &Request, resp: &mut Response) {
    if !client_copy_current(req, resp) {
        return;
    }

    match req.method {
        Method::GET | Method::HEAD => {
            resp.status = 304;
            resp.body = None;
            resp.suppress_header("Content-Length");
            resp.suppress_header("Content-Type");
        }
        _ => {
            resp.status = 412;
            resp.body = None;
        }
    }
}

fn client_copy_current(req: &Request, resp: &Response) -> bool {
    if let Some(inm) = req.header("if-none-match") {
        return match resp.header("ETag") {
            Some(etag) => etag_list_matches(inm, etag),
            None => false,
        };
    }

    if let Some(ims) = req.header("if-modified-since")
        && let Some(last_modified) = resp.header("Last-Modified")
        && let Some(since) = parse_http_date(ims)
        && let Some(modified) = parse_http_date(last_modified)
    {
        return modified <= since;
    }

    false
}

/// Matches an If-None-Match header (comma-separated list, `*` wildcard)
/// against a response ETag. Weak-comparison: a `W/` prefix is ignored.
fn etag_list_matches(list: &str, etag: &str) -> bool {
    let strip = |t: &str| t.trim().trim_start_matches("W/").to_string();
    let target = strip(etag);

    list.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || strip(candidate) == target
    })
}

/// Parses an RFC 7231 HTTP date ("Sun, 06 Nov 1994 08:49:37 GMT").
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats a timestamp as an RFC 7231 HTTP date.
pub fn format_http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_date_round_trip() {
        let s = "Sun, 06 Nov 1994 08:49:37 GMT";
        let dt = parse_http_date(s).unwrap();
        assert_eq!(format_http_date(dt), s);
    }

    #[test]
    fn etag_wildcard_and_list() {
        assert!(etag_list_matches("*", "\"abc\""));
        assert!(etag_list_matches("\"x\", \"abc\"", "\"abc\""));
        assert!(etag_list_matches("W/\"abc\"", "\"abc\""));
        assert!(!etag_list_matches("\"x\"", "\"abc\""));
    }
}
