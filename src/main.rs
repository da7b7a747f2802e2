use std::sync::Arc;

use beacon::config::Config;
use beacon::http::request::{Method, Request};
use beacon::http::response::Response;
use beacon::router::{ParamValue, RouteOptions};
use beacon::server::{Server, listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut server = Server::new(cfg)?;

    // Operational endpoint; feature modules register their own routes the
    // same way during startup.
    server.route(
        Method::GET,
        "/health",
        Arc::new(|_req: &Request, _params: &[ParamValue]| {
            Ok(Response::json(200, &serde_json::json!({ "status": "ok" })))
        }),
        RouteOptions::web(),
    )?;

    let server = Arc::new(server);

    if let Some(jwt) = &server.auth.jwt {
        jwt.spawn_refresh();
    }

    tokio::select! {
        res = listener::run(Arc::clone(&server)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
