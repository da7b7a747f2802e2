use std::collections::HashMap;

/// HTTP request methods.
///
/// The server implements the verb set the bot's REST API and web UI use.
/// Anything else on the wire is answered with 501 Not Implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// DELETE - Delete a resource
    DELETE,
}

/// HTTP protocol version negotiated on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// Body decoded according to the request's Content-Type.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Case-sensitive, as method tokens are on the wire.
    /// Returns `None` for any verb the server does not implement.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "HEAD" => Some(Method::HEAD),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "PATCH" => Some(Method::PATCH),
            "DELETE" => Some(Method::DELETE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }

    /// Whether a request with this method carries a body.
    ///
    /// GET/HEAD/DELETE transactions terminate after the header section.
    pub fn has_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }

    pub const ALL: [Method; 6] = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ];
}

impl Version {
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A parsed HTTP request, one transaction on a connection.
///
/// Header keys are normalized to lower-case on insertion, last write wins.
/// Query pairs keep the order they appeared in; a key with no `=` has a
/// `None` value. The body is present only when the client declared a
/// `Content-Length` and all of it was read.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Request path without the query string (e.g. "/api/config")
    pub path: String,
    /// Decoded query pairs in wire order
    pub query: Vec<(String, Option<String>)>,
    /// Headers, keys lower-cased
    pub headers: HashMap<String, String>,
    pub version: Version,
    /// Raw body bytes, if a body was declared and fully read
    pub body: Option<Vec<u8>>,
    /// Body decoded per Content-Type (JSON or form-encoded)
    pub decoded_body: Option<DecodedBody>,
    /// Authenticated identity, set by the auth subsystem
    pub identity: Option<String>,
    replied: bool,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    query: Vec<(String, Option<String>)>,
    version: Version,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            query: Vec::new(),
            version: Version::Http11,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.query.push((key.into(), value.map(str::to_string)));
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            query: self.query,
            headers: self.headers,
            version: self.version,
            body: self.body,
            decoded_body: None,
            identity: None,
            replied: false,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Assembles a request from parsed parts; header keys must already be
    /// lower-cased.
    pub fn from_parts(
        method: Method,
        path: String,
        query: Vec<(String, Option<String>)>,
        headers: HashMap<String, String>,
        version: Version,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            version,
            body,
            decoded_body: None,
            identity: None,
            replied: false,
        }
    }

    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// First value for a query key, if the key is present with a value.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// A cookie value from the Cookie header, if present.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let raw = self.header("cookie")?;
        for part in raw.split(';') {
            if let Some((k, v)) = part.trim().split_once('=')
                && k == name
            {
                return Some(v);
            }
        }
        None
    }

    /// Decodes the body according to Content-Type, populating `decoded_body`.
    ///
    /// An undecodable body is left raw; whether that is an error is up to the
    /// route's declared body type.
    pub fn decode_body(&mut self) {
        let Some(raw) = self.body.as_deref() else {
            return;
        };

        let content_type = self
            .header("content-type")
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        self.decoded_body = match content_type.as_str() {
            "application/json" => serde_json::from_slice(raw).ok().map(DecodedBody::Json),
            "application/x-www-form-urlencoded" => Some(DecodedBody::Form(
                url::form_urlencoded::parse(raw)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
            )),
            _ => None,
        };
    }

    /// Marks this request as replied-to.
    ///
    /// Returns `false` if it was already replied to; the caller must then
    /// skip the write (idempotence guard against double responses).
    pub fn mark_replied(&mut self) -> bool {
        if self.replied {
            return false;
        }
        self.replied = true;
        true
    }

    pub fn replied(&self) -> bool {
        self.replied
    }

    /// Reconstructs the request target (path plus query string).
    ///
    /// `skip` names a query parameter to leave out, used when building the
    /// auth redirect_uri without the token parameter.
    pub fn target_without_param(&self, skip: &str) -> String {
        let mut kept = self.query.iter().filter(|(k, _)| k != skip).peekable();
        if kept.peek().is_none() {
            return self.path.clone();
        }

        let mut qs = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in kept {
            match v {
                Some(v) => {
                    qs.append_pair(k, v);
                }
                None => {
                    qs.append_key_only(k);
                }
            }
        }
        format!("{}?{}", self.path, qs.finish())
    }
}
