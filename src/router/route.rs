use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// A route handler: pure function of the request and its captured
/// path parameters. An `Err` is converted to a 500 at the dispatch
/// boundary, never propagated to the connection.
pub type Handler = Arc<dyn Fn(&Request, &[ParamValue]) -> anyhow::Result<Response> + Send + Sync>;

/// Declared type of a path placeholder, used for capture coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `%s` - any non-empty segment text
    Str,
    /// `%d` - decimal digits, coerced to an integer
    Int,
}

/// A captured path parameter after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            ParamValue::Str(_) => None,
        }
    }
}

/// Body shape an API route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No body expected; one may still be present and is ignored
    None,
    Json,
    Form,
}

/// Required access for a route, as declared at registration.
///
/// `SameAs` derives the level from a previously registered named route, so a
/// web endpoint can mirror the access rules of the bot command it fronts.
#[derive(Debug, Clone)]
pub enum AccessRule {
    Public,
    Level(u32),
    SameAs(String),
}

/// Registration options beyond the verb/pattern/handler triple.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Typed REST API route: body enforcement and status rewrites apply
    pub api: bool,
    /// Name other routes can derive access from
    pub name: Option<String>,
    pub access: AccessRule,
    pub body: BodyKind,
}

impl RouteOptions {
    /// A plain web route: public, no body expectations.
    pub fn web() -> Self {
        Self {
            api: false,
            name: None,
            access: AccessRule::Public,
            body: BodyKind::None,
        }
    }

    /// A typed REST API route.
    pub fn api() -> Self {
        Self {
            api: true,
            name: None,
            access: AccessRule::Public,
            body: BodyKind::None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn access_level(mut self, level: u32) -> Self {
        self.access = AccessRule::Level(level);
        self
    }

    pub fn access_same_as(mut self, name: impl Into<String>) -> Self {
        self.access = AccessRule::SameAs(name.into());
        self
    }

    pub fn body(mut self, kind: BodyKind) -> Self {
        self.body = kind;
        self
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern {0:?}")]
    InvalidPattern(String),
    #[error("unknown route name {0:?} for access derivation")]
    UnknownDerivation(String),
}

/// A compiled route binding.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    regex: Regex,
    pub params: Vec<ParamKind>,
    /// Specificity keys, computed once at compile time
    pub segments: usize,
    pub literal_len: usize,
    pub handler: Handler,
    pub options: RouteOptions,
    /// Access level after SameAs resolution; `None` = public
    pub min_access: Option<u32>,
}

impl Route {
    /// Compiles a `%s`/`%d` pattern into an anchored capturing regex.
    ///
    /// Literal text is regex-escaped; `%s` becomes `(.+?)` and `%d` becomes
    /// `(\d+?)`. A stray `%` is literal.
    pub fn compile(
        method: Method,
        pattern: &str,
        handler: Handler,
        options: RouteOptions,
        min_access: Option<u32>,
    ) -> Result<Self, RouteError> {
        let mut source = String::from("^");
        let mut params = Vec::new();
        let mut literal_len = 0usize;

        let mut rest = pattern;
        while let Some(idx) = rest.find('%') {
            let (lit, tail) = rest.split_at(idx);
            source.push_str(&regex::escape(lit));
            literal_len += lit.len();

            match tail.as_bytes().get(1) {
                Some(b's') => {
                    source.push_str("(.+?)");
                    params.push(ParamKind::Str);
                    rest = &tail[2..];
                }
                Some(b'd') => {
                    source.push_str(r"(\d+?)");
                    params.push(ParamKind::Int);
                    rest = &tail[2..];
                }
                _ => {
                    source.push_str(&regex::escape("%"));
                    literal_len += 1;
                    rest = &tail[1..];
                }
            }
        }
        source.push_str(&regex::escape(rest));
        literal_len += rest.len();
        source.push('$');

        let regex =
            Regex::new(&source).map_err(|_| RouteError::InvalidPattern(pattern.to_string()))?;

        let segments = pattern.split('/').filter(|s| !s.is_empty()).count();

        Ok(Self {
            method,
            pattern: pattern.to_string(),
            regex,
            params,
            segments,
            literal_len,
            handler,
            options,
            min_access,
        })
    }

    /// Matches a path, extracting coerced captures in order.
    ///
    /// Returns `None` when the path does not match or an integer capture
    /// does not fit an i64.
    pub fn matches(&self, path: &str) -> Option<Vec<ParamValue>> {
        let caps = self.regex.captures(path)?;

        let mut values = Vec::with_capacity(self.params.len());
        for (i, kind) in self.params.iter().enumerate() {
            let text = caps.get(i + 1)?.as_str();
            match kind {
                ParamKind::Str => values.push(ParamValue::Str(text.to_string())),
                ParamKind::Int => values.push(ParamValue::Int(text.parse().ok()?)),
            }
        }

        Some(values)
    }

    /// Number of wildcard captures; the second specificity key.
    pub fn wildcards(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("min_access", &self.min_access)
            .finish()
    }
}
