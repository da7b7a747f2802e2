use beacon::http::conditional::{apply, format_http_date, parse_http_date};
use beacon::http::request::{Method, Request, RequestBuilder};
use beacon::http::response::{Response, ResponseBuilder};
use chrono::{Duration, Utc};

fn request(method: Method) -> RequestBuilder {
    RequestBuilder::new().method(method).path("/style.css")
}

fn response_with_etag(etag: &str) -> Response {
    ResponseBuilder::new(200)
        .header("ETag", etag)
        .body(b"body { color: red }".to_vec())
        .build()
}

#[test]
fn test_matching_etag_yields_304_for_get() {
    let req: Request = request(Method::GET)
        .header("If-None-Match", "\"abc\"")
        .build()
        .unwrap();
    let mut resp = response_with_etag("\"abc\"");

    apply(&req, &mut resp);

    assert_eq!(resp.status, 304);
    assert!(resp.body.is_none());
    // Validator survives on the 304
    assert_eq!(resp.header("ETag"), Some("\"abc\""));
}

#[test]
fn test_matching_etag_yields_412_for_put() {
    let req = request(Method::PUT)
        .header("If-None-Match", "\"abc\"")
        .build()
        .unwrap();
    let mut resp = response_with_etag("\"abc\"");

    apply(&req, &mut resp);

    assert_eq!(resp.status, 412);
}

#[test]
fn test_non_matching_etag_leaves_response_alone() {
    let req = request(Method::GET)
        .header("If-None-Match", "\"other\"")
        .build()
        .unwrap();
    let mut resp = response_with_etag("\"abc\"");

    apply(&req, &mut resp);

    assert_eq!(resp.status, 200);
    assert!(resp.body.is_some());
}

#[test]
fn test_etag_list_and_wildcard() {
    let req = request(Method::GET)
        .header("If-None-Match", "\"x\", \"abc\", \"y\"")
        .build()
        .unwrap();
    let mut resp = response_with_etag("\"abc\"");
    apply(&req, &mut resp);
    assert_eq!(resp.status, 304);

    let req = request(Method::GET)
        .header("If-None-Match", "*")
        .build()
        .unwrap();
    let mut resp = response_with_etag("\"anything\"");
    apply(&req, &mut resp);
    assert_eq!(resp.status, 304);
}

#[test]
fn test_if_modified_since_not_modified() {
    let modified = Utc::now() - Duration::hours(2);
    let cached_at = Utc::now() - Duration::hours(1);

    let req = request(Method::GET)
        .header("If-Modified-Since", format_http_date(cached_at))
        .build()
        .unwrap();
    let mut resp = ResponseBuilder::new(200)
        .header("Last-Modified", format_http_date(modified))
        .body(b"css".to_vec())
        .build();

    apply(&req, &mut resp);

    assert_eq!(resp.status, 304);
}

#[test]
fn test_if_modified_since_stale_copy() {
    let modified = Utc::now() - Duration::hours(1);
    let cached_at = Utc::now() - Duration::hours(2);

    let req = request(Method::GET)
        .header("If-Modified-Since", format_http_date(cached_at))
        .build()
        .unwrap();
    let mut resp = ResponseBuilder::new(200)
        .header("Last-Modified", format_http_date(modified))
        .body(b"css".to_vec())
        .build();

    apply(&req, &mut resp);

    assert_eq!(resp.status, 200);
}

#[test]
fn test_304_suppression_ignores_header_casing() {
    let req = request(Method::GET)
        .header("If-None-Match", "\"abc\"")
        .build()
        .unwrap();
    let mut resp = ResponseBuilder::new(200)
        .header("etag", "\"abc\"")
        .header("content-type", "text/css")
        .header("content-length", "3")
        .body(b"css".to_vec())
        .build();

    apply(&req, &mut resp);

    assert_eq!(resp.status, 304);
    assert_eq!(resp.header("Content-Type"), None);
    assert_eq!(resp.header("Content-Length"), None);
    assert_eq!(resp.header("ETag"), Some("\"abc\""));
}

#[test]
fn test_no_validators_no_change() {
    let req = request(Method::GET)
        .header("If-None-Match", "\"abc\"")
        .build()
        .unwrap();
    let mut resp = Response::ok("no validators here");

    apply(&req, &mut resp);

    assert_eq!(resp.status, 200);
}

#[test]
fn test_unparsable_date_is_ignored() {
    let req = request(Method::GET)
        .header("If-Modified-Since", "not a date")
        .build()
        .unwrap();
    let mut resp = ResponseBuilder::new(200)
        .header("Last-Modified", format_http_date(Utc::now()))
        .build();

    apply(&req, &mut resp);

    assert_eq!(resp.status, 200);
}

#[test]
fn test_http_date_parsing() {
    let dt = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
    assert_eq!(format_http_date(dt), "Sun, 06 Nov 1994 08:49:37 GMT");
    assert!(parse_http_date("garbage").is_none());
}
