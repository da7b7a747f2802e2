//! Route table and path matching.
//!
//! Routes are grouped by verb and kept ordered most-specific-first, so the
//! first regex hit is always the winning route. Registration happens once at
//! startup from each feature module; the table is never mutated afterwards.

pub mod route;

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::http::request::Method;

pub use route::{
    AccessRule, BodyKind, Handler, ParamKind, ParamValue, Route, RouteError, RouteOptions,
};

/// Outcome of matching a request against the table.
pub enum RouteMatch<'a> {
    /// A route for this verb matched; captures are in pattern order.
    Found {
        route: &'a Route,
        params: Vec<ParamValue>,
    },
    /// The path exists under other verbs; carries the Allow set.
    MethodMismatch { allow: Vec<Method> },
    NotFound,
}

#[derive(Default)]
pub struct Router {
    by_verb: HashMap<Method, Vec<Route>>,
    /// Resolved access level per named route, for SameAs derivation
    levels: HashMap<String, Option<u32>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route, keeping the verb's table in specificity order:
    /// more segments first, then fewer wildcards, then more literal text.
    pub fn add(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        options: RouteOptions,
    ) -> Result<(), RouteError> {
        let min_access = match &options.access {
            AccessRule::Public => None,
            AccessRule::Level(level) => Some(*level),
            AccessRule::SameAs(name) => self
                .levels
                .get(name)
                .copied()
                .ok_or_else(|| RouteError::UnknownDerivation(name.clone()))?,
        };

        let route = Route::compile(method, pattern, handler, options, min_access)?;

        if let Some(name) = &route.options.name {
            self.levels.insert(name.clone(), min_access);
        }

        tracing::debug!(
            method = method.as_str(),
            pattern = %route.pattern,
            min_access = ?min_access,
            "route registered"
        );

        let table = self.by_verb.entry(method).or_default();
        table.push(route);
        table.sort_by_key(|r| (Reverse(r.segments), r.wildcards(), Reverse(r.literal_len)));

        Ok(())
    }

    /// Finds the most specific route for a verb and path.
    ///
    /// A path that matches under a different verb yields `MethodMismatch`
    /// with the Allow set, never `NotFound`.
    pub fn find(&self, method: Method, path: &str) -> RouteMatch<'_> {
        if let Some(table) = self.by_verb.get(&method) {
            for route in table {
                if let Some(params) = route.matches(path) {
                    return RouteMatch::Found { route, params };
                }
            }
        }

        // HEAD falls back to the GET table; the writer strips the body.
        if method == Method::HEAD
            && let Some(table) = self.by_verb.get(&Method::GET)
        {
            for route in table {
                if let Some(params) = route.matches(path) {
                    return RouteMatch::Found { route, params };
                }
            }
        }

        let allow = self.allowed_methods(path, method);
        if allow.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodMismatch { allow }
        }
    }

    /// Verbs other than `except` that have a route matching `path`.
    ///
    /// HEAD is listed whenever GET is served, mirroring the fallback in
    /// `find`.
    fn allowed_methods(&self, path: &str, except: Method) -> Vec<Method> {
        let matches_verb = |m: Method| {
            self.by_verb
                .get(&m)
                .is_some_and(|table| table.iter().any(|r| r.matches(path).is_some()))
        };

        Method::ALL
            .into_iter()
            .filter(|&m| m != except)
            .filter(|&m| matches_verb(m) || (m == Method::HEAD && matches_verb(Method::GET)))
            .collect()
    }
}
