use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use beacon::config::Config;
use beacon::http::connection::Connection;
use beacon::http::request::{Method, Request, RequestBuilder};
use beacon::http::response::{Response, ResponseBuilder};
use beacon::router::{BodyKind, ParamValue, RouteOptions};
use beacon::server::Server;

fn test_server() -> Server {
    let mut cfg = Config::default();
    // Short idle timeout so pipelined tests finish quickly
    cfg.server.keep_alive_secs = 1;

    let mut server = Server::new(cfg).unwrap();

    server
        .route(
            Method::GET,
            "/hello",
            Arc::new(|_req: &Request, _params: &[ParamValue]| Ok(Response::ok("hello world"))),
            RouteOptions::web(),
        )
        .unwrap();

    server
        .route(
            Method::GET,
            "/tagged",
            Arc::new(|_req: &Request, _params: &[ParamValue]| {
                Ok(ResponseBuilder::new(200)
                    .header("ETag", "\"v1\"")
                    .body(b"tagged content".to_vec())
                    .build())
            }),
            RouteOptions::web(),
        )
        .unwrap();

    server
        .route(
            Method::POST,
            "/api/raid/start",
            Arc::new(|_req: &Request, _params: &[ParamValue]| Ok(Response::status(200))),
            RouteOptions::api(),
        )
        .unwrap();

    server
        .route(
            Method::DELETE,
            "/api/raid/%d",
            Arc::new(|_req: &Request, params: &[ParamValue]| {
                assert!(params[0].as_int().is_some());
                Ok(Response::status(200))
            }),
            RouteOptions::api(),
        )
        .unwrap();

    server
        .route(
            Method::POST,
            "/api/config",
            Arc::new(|req: &Request, _params: &[ParamValue]| {
                Ok(Response::ok(req.body.clone().unwrap_or_default()))
            }),
            RouteOptions::api().body(BodyKind::Json),
        )
        .unwrap();

    server
        .route(
            Method::GET,
            "/admin",
            Arc::new(|req: &Request, _params: &[ParamValue]| {
                Ok(Response::ok(req.identity.clone().unwrap_or_default()))
            }),
            RouteOptions::web().access_level(5),
        )
        .unwrap();

    server
}

async fn spawn(server: Server) -> SocketAddr {
    let server = Arc::new(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let mut conn = Connection::new(socket, server);
                let _ = conn.run().await;
            });
        }
    });

    addr
}

/// Writes raw request bytes and reads everything until the server closes.
async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn test_get_dispatches_and_keeps_alive() {
    let addr = spawn(test_server()).await;

    // Two pipelined transactions on one connection
    let reply = exchange(
        addr,
        b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\nGET /hello HTTP/1.1\r\nHost: x\r\n\r\n",
    )
    .await;

    assert_eq!(reply.matches("HTTP/1.1 200 OK").count(), 2);
    assert_eq!(reply.matches("hello world").count(), 2);
    assert!(reply.contains("Connection: Keep-Alive"));
    assert!(reply.contains("Keep-Alive: timeout=1"));
}

#[tokio::test]
async fn test_connection_close_honored() {
    let addr = spawn(test_server()).await;

    let reply = exchange(
        addr,
        b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(reply.contains("HTTP/1.1 200 OK"));
    assert!(reply.contains("Connection: Close"));
}

#[tokio::test]
async fn test_http_10_defaults_to_close() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"GET /hello HTTP/1.0\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 200 OK"));
    assert!(reply.contains("Connection: Close"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 404 Not Found"));
    assert!(reply.contains("<h1>404 Not Found</h1>"));
}

#[tokio::test]
async fn test_verb_mismatch_is_405_with_allow() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"GET /api/raid/start HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 405 Method Not Allowed"));
    assert!(reply.contains("Allow: POST"));
}

#[tokio::test]
async fn test_unsupported_method_is_501() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"BREW /coffee HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 501 Not Implemented"));
}

#[tokio::test]
async fn test_malformed_request_line_is_400() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"GET\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_post_without_length_is_411() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"POST /api/raid/start HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 411 Length Required"));
}

#[tokio::test]
async fn test_oversized_body_is_413_before_body_arrives() {
    let addr = spawn(test_server()).await;

    // Declared length over 1 MiB; no body bytes are sent at all
    let reply = exchange(
        addr,
        b"POST /api/raid/start HTTP/1.1\r\nHost: x\r\nContent-Length: 2000000\r\n\r\n",
    )
    .await;

    assert!(reply.contains("HTTP/1.1 413 Payload Too Large"));
}

#[tokio::test]
async fn test_body_read_across_writes() {
    let addr = spawn(test_server()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /api/config HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 17\r\n\r\n{\"max_po")
        .await
        .unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    stream.write_all(b"ints\":10}").await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let reply = String::from_utf8_lossy(&out);

    assert!(reply.contains("HTTP/1.1 200 OK"));
    assert!(reply.contains("{\"max_points\":10}"));
}

#[tokio::test]
async fn test_api_body_type_enforced() {
    let addr = spawn(test_server()).await;

    let reply = exchange(
        addr,
        b"POST /api/config HTTP/1.1\r\nHost: x\r\nContent-Length: 8\r\n\r\nnot json",
    )
    .await;

    assert!(reply.contains("HTTP/1.1 415 Unsupported Media Type"));
}

#[tokio::test]
async fn test_post_status_rewritten_to_201() {
    let addr = spawn(test_server()).await;

    let reply = exchange(
        addr,
        b"POST /api/raid/start HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n",
    )
    .await;

    assert!(reply.contains("HTTP/1.1 201 Created"));
}

#[tokio::test]
async fn test_delete_status_rewritten_to_204() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"DELETE /api/raid/7 HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 204 No Content"));
}

#[tokio::test]
async fn test_head_reuses_get_route_without_body() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"HEAD /hello HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 200 OK"));
    assert!(reply.contains("Content-Length: 11"));
    assert!(!reply.contains("hello world"));
}

#[tokio::test]
async fn test_conditional_get_applies_to_handler_response() {
    let addr = spawn(test_server()).await;

    let reply = exchange(
        addr,
        b"GET /tagged HTTP/1.1\r\nHost: x\r\nIf-None-Match: \"v1\"\r\n\r\n",
    )
    .await;

    assert!(reply.contains("HTTP/1.1 304 Not Modified"));
    assert!(!reply.contains("tagged content"));
}

#[tokio::test]
async fn test_protected_route_unauthenticated_is_401() {
    let addr = spawn(test_server()).await;

    let reply = exchange(addr, b"GET /admin HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(reply.contains("HTTP/1.1 401 Unauthorized"));
    assert!(reply.contains("WWW-Authenticate: Basic"));
}

#[tokio::test]
async fn test_protected_route_access_levels() {
    let server = test_server();

    // Low access: authenticated but below the route's requirement
    let low = server.auth.basic.issue("viewer");
    let high = server.auth.basic.issue("admin");
    server.auth.set_level("admin", 9);

    let addr = spawn(server).await;

    let auth = |user: &str, token: &str| {
        format!(
            "GET /admin HTTP/1.1\r\nHost: x\r\nAuthorization: Basic {}\r\n\r\n",
            STANDARD.encode(format!("{user}:{token}"))
        )
    };

    let reply = exchange(addr, auth("viewer", &low).as_bytes()).await;
    assert!(reply.contains("HTTP/1.1 403 Forbidden"));

    let reply = exchange(addr, auth("admin", &high).as_bytes()).await;
    assert!(reply.contains("HTTP/1.1 200 OK"));
    assert!(reply.contains("admin"));
}

#[tokio::test]
async fn test_tls_handshake_closed_silently_and_immediately() {
    let addr = spawn(test_server()).await;

    let started = std::time::Instant::now();
    let reply = exchange(addr, &[0x16, 0x03, 0x01, 0x00, 0x05, 0x01, 0x00, 0x00]).await;

    assert!(reply.is_empty());
    // Closed right away, not held open until the idle timeout
    assert!(started.elapsed() < std::time::Duration::from_millis(900));
}

#[tokio::test]
async fn test_double_reply_is_noop() {
    // Exercised at the model level: the connection marks a request replied
    // before writing, and a second write attempt must be skipped.
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .build()
        .unwrap();

    assert!(req.mark_replied());
    assert!(!req.mark_replied());
}

#[tokio::test]
async fn test_dispatch_handler_error_becomes_500() {
    let mut server = test_server();
    server
        .route(
            Method::GET,
            "/boom",
            Arc::new(|_req: &Request, _params: &[ParamValue]| anyhow::bail!("handler exploded")),
            RouteOptions::web(),
        )
        .unwrap();

    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .path("/boom")
        .build()
        .unwrap();

    let resp = server.dispatch(&mut req).await;
    assert_eq!(resp.status, 500);
}
