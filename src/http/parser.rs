//! Incremental HTTP/1.1 parse steps.
//!
//! Pure functions over the connection's read buffer; all parse state lives in
//! the connection's phase machine. Each function consumes at most one line so
//! a partial buffer never blocks progress elsewhere.

use crate::http::request::{Method, Version};
use bytes::BytesMut;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("unsupported method")]
    UnsupportedMethod,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("malformed header line")]
    InvalidHeader,
}

/// Everything the request line carries.
#[derive(Debug, PartialEq)]
pub struct RequestLine {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, Option<String>)>,
    pub version: Version,
}

/// Pops one CRLF-terminated line off the front of `buf`.
///
/// Returns `None` until a full line is buffered. A bare LF is tolerated, as
/// the robustness principle suggests; the terminator is consumed either way.
pub fn take_line(buf: &mut BytesMut) -> Option<String> {
    let nl = buf.iter().position(|&b| b == b'\n')?;
    let line = buf.split_to(nl + 1);

    let mut end = nl;
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }

    Some(String::from_utf8_lossy(&line[..end]).into_owned())
}

/// Detects a raw TLS ClientHello sent to this plaintext port.
///
/// Record type 0x16 (handshake) followed by handshake type 0x01 (ClientHello)
/// at offset 5. Returns `None` until enough bytes arrived to decide.
pub fn sniff_tls_client_hello(buf: &[u8]) -> Option<bool> {
    if buf.is_empty() {
        return None;
    }
    if buf[0] != 0x16 {
        return Some(false);
    }
    if buf.len() < 6 {
        return None;
    }
    Some(buf[5] == 0x01)
}

/// Parses `METHOD SP path-and-query SP HTTP/ver`.
pub fn parse_request_line(line: &str) -> Result<RequestLine, ParseError> {
    let mut parts = line.split_whitespace();

    let method_token = parts.next().ok_or(ParseError::InvalidRequestLine)?;
    let target = parts.next().ok_or(ParseError::InvalidRequestLine)?;
    let version_token = parts.next().ok_or(ParseError::InvalidRequestLine)?;

    if parts.next().is_some() {
        return Err(ParseError::InvalidRequestLine);
    }

    let method = Method::from_token(method_token).ok_or(ParseError::UnsupportedMethod)?;
    let version = Version::from_token(version_token).ok_or(ParseError::UnsupportedVersion)?;
    let (path, query) = parse_target(target)?;

    Ok(RequestLine {
        method,
        path,
        query,
        version,
    })
}

/// Splits a request target into its path and decoded query pairs.
///
/// The target must be origin-form or absolute-form; resolving it against a
/// dummy base catches both and rejects garbage.
fn parse_target(target: &str) -> Result<(String, Vec<(String, Option<String>)>), ParseError> {
    let base = url::Url::parse("http://unused.invalid/").expect("static base url");
    let url = base
        .join(target)
        .map_err(|_| ParseError::InvalidRequestLine)?;

    let query = match url.query() {
        Some(qs) => parse_query(qs),
        None => Vec::new(),
    };

    Ok((url.path().to_string(), query))
}

/// Decodes a query string into ordered pairs.
///
/// A component without `=` keeps a `None` value, distinct from `key=`.
fn parse_query(qs: &str) -> Vec<(String, Option<String>)> {
    let mut pairs = Vec::new();
    for component in qs.split('&') {
        if component.is_empty() {
            continue;
        }
        match component.split_once('=') {
            Some(_) => {
                if let Some((k, v)) = url::form_urlencoded::parse(component.as_bytes()).next() {
                    pairs.push((k.into_owned(), Some(v.into_owned())));
                }
            }
            None => {
                if let Some((k, _)) = url::form_urlencoded::parse(component.as_bytes()).next() {
                    pairs.push((k.into_owned(), None));
                }
            }
        }
    }
    pairs
}

/// Parses a `key: value` header line into a lower-cased key and trimmed value.
pub fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::InvalidHeader);
    }

    Ok((key.to_ascii_lowercase(), value.trim().to_string()))
}
