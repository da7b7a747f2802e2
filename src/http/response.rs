use std::collections::HashMap;

/// Returns the standard reason phrase for a status code.
///
/// Codes outside the table get "Unknown"; they are still legal on the wire.
///
/// # Example
///
/// ```
/// # use beacon::http::response::reason_phrase;
/// assert_eq!(reason_phrase(200), "OK");
/// assert_eq!(reason_phrase(418), "Unknown");
/// ```
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Inserts a header value, folding keys that differ only by case onto the
/// casing already stored. Keeps the map free of duplicate headers.
fn insert_header(headers: &mut HashMap<String, Option<String>>, key: String, value: Option<String>) {
    match headers.keys().find(|k| k.eq_ignore_ascii_case(&key)).cloned() {
        Some(existing) => {
            headers.insert(existing, value);
        }
        None => {
            headers.insert(key, value);
        }
    }
}

/// A response ready to be serialized back to the client.
///
/// Header values are `Option<String>`: an explicit `None` suppresses a header
/// the serializer would otherwise add (Content-Length on a 304, for example).
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, Option<String>>,
    pub body: Option<Vec<u8>>,
    /// Close the connection after this response regardless of keep-alive rules
    pub force_close: bool,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use beacon::http::response::ResponseBuilder;
/// let response = ResponseBuilder::new(200)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// assert_eq!(response.status, 200);
/// ```
pub struct ResponseBuilder {
    status: u16,
    headers: HashMap<String, Option<String>>,
    body: Option<Vec<u8>>,
    force_close: bool,
}

impl ResponseBuilder {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
            force_close: false,
        }
    }

    /// Adds or replaces a header, case-insensitively on the key.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, key.into(), Some(value.into()));
        self
    }

    /// Suppresses a header the serializer would add by default.
    pub fn suppress_header(mut self, key: impl Into<String>) -> Self {
        insert_header(&mut self.headers, key.into(), None);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn force_close(mut self) -> Self {
        self.force_close = true;
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
            force_close: self.force_close,
        }
    }
}

impl Response {
    /// Creates a 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(200).body(body.into()).build()
    }

    /// Creates a bodyless response; 4xx/5xx get an error page at send time.
    pub fn status(status: u16) -> Self {
        ResponseBuilder::new(status).build()
    }

    /// Creates a JSON response with the right Content-Type.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "application/json")
            .body(value.to_string().into_bytes())
            .build()
    }

    /// Retrieves a header value by name, case-insensitively.
    ///
    /// Returns `None` both for absent and for explicitly suppressed headers.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        insert_header(&mut self.headers, key.into(), Some(value.into()));
    }

    /// Suppresses a header, overriding any casing variant already set.
    pub fn suppress_header(&mut self, key: impl Into<String>) {
        insert_header(&mut self.headers, key.into(), None);
    }

    /// Whether any casing of this key is present, suppressed entries included.
    fn has_header(&self, key: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    /// The minimal HTML page served for 4xx/5xx responses without a body.
    pub fn error_page(status: u16) -> Vec<u8> {
        let phrase = reason_phrase(status);
        format!(
            "<html><head><title>{status} {phrase}</title></head>\
             <body><h1>{status} {phrase}</h1></body></html>"
        )
        .into_bytes()
    }

    /// Fills in derived parts before serialization.
    ///
    /// 4xx/5xx without an explicit body get the minimal error page (except
    /// for HEAD requests), and a present body implies Content-Length unless
    /// the header was explicitly suppressed.
    pub fn finalize(&mut self, head_only: bool) {
        if self.status >= 400 && self.body.is_none() && !head_only {
            self.body = Some(Self::error_page(self.status));
            if !self.has_header("Content-Type") {
                self.set_header("Content-Type", "text/html");
            }
        }

        if self.body.is_some() && !self.has_header("Content-Length") {
            let len = self.body.as_ref().map(Vec::len).unwrap_or_default();
            self.set_header("Content-Length", len.to_string());
        }
    }
}
