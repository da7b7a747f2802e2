//! The server: route table, auth state and static files under one owner.
//!
//! Feature modules register their routes against a `&mut Server` during
//! startup; the server is then wrapped in an `Arc` and handed to the accept
//! loop. Nothing mutates the route table after that point.

pub mod listener;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::files::StaticFiles;
use crate::http::request::{DecodedBody, Method, Request};
use crate::http::response::{Response, ResponseBuilder};
use crate::router::{BodyKind, Handler, RouteMatch, RouteOptions, Router};

pub struct Server {
    pub config: Config,
    pub router: Router,
    pub auth: AuthContext,
    pub static_files: Option<StaticFiles>,
}

impl Server {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let auth = AuthContext::new(&config.auth)?;
        let static_files = config.static_files.as_ref().map(StaticFiles::new);

        Ok(Self {
            config,
            router: Router::new(),
            auth,
            static_files,
        })
    }

    /// Registers a route; the registration boundary feature modules call
    /// during startup.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        options: RouteOptions,
    ) -> anyhow::Result<()> {
        self.router.add(method, pattern, handler, options)?;
        Ok(())
    }

    /// Resolves identity, finds a handler and produces the response.
    ///
    /// Handler failures are converted to 500 here; nothing a handler does can
    /// take the connection down.
    pub async fn dispatch(&self, req: &mut Request) -> Response {
        req.identity = self.auth.resolve(req);

        match self.router.find(req.method, &req.path) {
            RouteMatch::Found { route, params } => {
                if let Some(min_access) = route.min_access {
                    let Some(identity) = &req.identity else {
                        return self.auth.challenge(req);
                    };
                    let level = self.auth.level_of(identity);
                    if level < min_access {
                        tracing::debug!(
                            identity = %identity,
                            level,
                            required = min_access,
                            path = %req.path,
                            "insufficient access level"
                        );
                        return Response::status(403);
                    }
                }

                if route.options.api && !body_matches(route.options.body, req) {
                    return Response::status(415);
                }

                let mut response = match (route.handler)(req, &params) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(
                            method = req.method.as_str(),
                            path = %req.path,
                            error = %e,
                            "handler failed"
                        );
                        Response::status(500)
                    }
                };

                if route.options.api {
                    rewrite_api_status(req.method, &mut response);
                }

                response
            }

            RouteMatch::MethodMismatch { allow } => {
                let allow = allow
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                ResponseBuilder::new(405).header("Allow", allow).build()
            }

            RouteMatch::NotFound => {
                if matches!(req.method, Method::GET | Method::HEAD)
                    && let Some(files) = &self.static_files
                {
                    return files.serve(req).await;
                }
                Response::status(404)
            }
        }
    }
}

fn body_matches(required: BodyKind, req: &Request) -> bool {
    match required {
        BodyKind::None => true,
        BodyKind::Json => matches!(req.decoded_body, Some(DecodedBody::Json(_))),
        BodyKind::Form => matches!(req.decoded_body, Some(DecodedBody::Form(_))),
    }
}

/// REST status conventions: a bare 200 becomes 201 for a successful POST
/// and 204 for PUT/PATCH/DELETE.
fn rewrite_api_status(method: Method, response: &mut Response) {
    if response.status != 200 {
        return;
    }
    let empty = response.body.as_ref().is_none_or(|b| b.is_empty());
    if !empty {
        return;
    }

    match method {
        Method::POST => response.status = 201,
        Method::PUT | Method::PATCH | Method::DELETE => response.status = 204,
        _ => {}
    }
}
