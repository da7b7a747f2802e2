use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::conditional;
use crate::http::parser::{
    self, ParseError, RequestLine, parse_header_line, parse_request_line, take_line,
};
use crate::http::request::{Method, Request, Version};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::Server;

/// Hard cap on request bodies; bounds memory per connection.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Where the connection is in parsing the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
    Ready,
    /// A protocol error occurred; drain anything else the peer sends
    /// without looking at it, until the socket closes.
    Ignoring,
}

/// Request-in-progress, accumulated across readiness events.
struct Partial {
    line: RequestLine,
    headers: HashMap<String, String>,
    content_length: usize,
    body: Option<Vec<u8>>,
}

enum Step {
    /// Made progress from buffered bytes; run the next step
    Continue,
    /// Cannot progress without more bytes from the socket
    NeedMore,
    /// Transaction or connection is finished
    Close,
}

/// One client connection: a read buffer plus the phase state machine.
///
/// Exactly one request is being built at a time. After a keep-alive response
/// the phase resets to `AwaitingRequestLine` so pipelined bytes already in
/// the buffer are picked up without another read.
pub struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    phase: Phase,
    partial: Option<Partial>,
    server: Arc<Server>,
}

impl Connection {
    pub fn new(stream: TcpStream, server: Arc<Server>) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            phase: Phase::AwaitingRequestLine,
            partial: None,
            server,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match self.step().await? {
                Step::Continue => continue,
                Step::NeedMore => {
                    if !self.fill().await? {
                        // Peer closed (or idled out); nothing more to do.
                        return Ok(());
                    }
                }
                Step::Close => return Ok(()),
            }
        }
    }

    /// Performs exactly the parse/dispatch operation valid for the current
    /// phase, consuming only buffered bytes. Never blocks.
    async fn step(&mut self) -> anyhow::Result<Step> {
        match self.phase {
            Phase::AwaitingRequestLine => self.step_request_line().await,
            Phase::AwaitingHeaders => self.step_header_line().await,
            Phase::AwaitingBody => Ok(self.step_body()),
            Phase::Ready => self.step_dispatch().await,
            Phase::Ignoring => {
                self.buf.clear();
                Ok(Step::NeedMore)
            }
        }
    }

    async fn step_request_line(&mut self) -> anyhow::Result<Step> {
        // A TLS handshake aimed at this plaintext port would otherwise hang
        // silently; drain and close without a response.
        match parser::sniff_tls_client_hello(&self.buf) {
            None => return Ok(Step::NeedMore),
            Some(true) => {
                // No response; the handshake bytes already buffered are
                // dropped and the peer sees an immediate close.
                tracing::debug!("TLS ClientHello on plaintext port, closing");
                self.buf.clear();
                return Ok(Step::Close);
            }
            Some(false) => {}
        }

        let Some(line) = take_line(&mut self.buf) else {
            return Ok(Step::NeedMore);
        };

        // Tolerate blank lines between pipelined requests.
        if line.is_empty() {
            return Ok(Step::Continue);
        }

        match parse_request_line(&line) {
            Ok(request_line) => {
                self.partial = Some(Partial {
                    line: request_line,
                    headers: HashMap::new(),
                    content_length: 0,
                    body: None,
                });
                self.phase = Phase::AwaitingHeaders;
                Ok(Step::Continue)
            }
            Err(ParseError::UnsupportedMethod) => {
                self.send_error(501).await?;
                Ok(Step::Close)
            }
            Err(e) => {
                tracing::debug!(error = %e, "malformed request line");
                self.send_error(400).await?;
                self.phase = Phase::Ignoring;
                Ok(Step::Continue)
            }
        }
    }

    async fn step_header_line(&mut self) -> anyhow::Result<Step> {
        let Some(line) = take_line(&mut self.buf) else {
            return Ok(Step::NeedMore);
        };

        if !line.is_empty() {
            match parse_header_line(&line) {
                Ok((key, value)) => {
                    // Lower-cased keys, duplicates overwritten.
                    let partial = self.partial.as_mut().expect("partial in AwaitingHeaders");
                    partial.headers.insert(key, value);
                    return Ok(Step::Continue);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "malformed header line");
                    self.send_error(400).await?;
                    self.phase = Phase::Ignoring;
                    return Ok(Step::Continue);
                }
            }
        }

        // Blank line: header section complete.
        let (has_body, declared_length) = {
            let partial = self.partial.as_ref().expect("partial in AwaitingHeaders");
            (
                partial.line.method.has_body(),
                partial.headers.get("content-length").cloned(),
            )
        };

        if !has_body {
            // GET/HEAD/DELETE transactions terminate here.
            self.phase = Phase::Ready;
            return Ok(Step::Continue);
        }

        let content_length = match declared_length.as_deref().map(str::parse::<usize>) {
            Some(Ok(n)) => n,
            // Missing or non-numeric length on a body-bearing method
            _ => {
                self.send_error(411).await?;
                return Ok(Step::Close);
            }
        };

        if content_length > MAX_BODY_BYTES {
            self.send_error(413).await?;
            return Ok(Step::Close);
        }

        let partial = self.partial.as_mut().expect("partial in AwaitingHeaders");
        partial.content_length = content_length;
        if content_length == 0 {
            partial.body = Some(Vec::new());
            self.phase = Phase::Ready;
        } else {
            self.phase = Phase::AwaitingBody;
        }
        Ok(Step::Continue)
    }

    fn step_body(&mut self) -> Step {
        let partial = self.partial.as_mut().expect("partial in AwaitingBody");

        if self.buf.len() < partial.content_length {
            return Step::NeedMore;
        }

        let body = self.buf.split_to(partial.content_length);
        partial.body = Some(body.to_vec());
        self.phase = Phase::Ready;
        Step::Continue
    }

    async fn step_dispatch(&mut self) -> anyhow::Result<Step> {
        let partial = self.partial.take().expect("partial in Ready");
        let mut req = Request::from_parts(
            partial.line.method,
            partial.line.path,
            partial.line.query,
            partial.headers,
            partial.line.version,
            partial.body,
        );
        req.decode_body();

        let response = self.server.dispatch(&mut req).await;
        let keep_alive = self.write_response(&mut req, response).await?;

        tracing::debug!(
            method = req.method.as_str(),
            path = %req.path,
            keep_alive,
            "transaction complete"
        );

        // Reset for pipelined/keep-alive reuse.
        self.phase = Phase::AwaitingRequestLine;

        if keep_alive {
            Ok(Step::Continue)
        } else {
            Ok(Step::Close)
        }
    }

    /// Serializes and writes a response, deciding keep-alive.
    ///
    /// A second reply to the same request is a no-op. Conditional headers are
    /// evaluated here so the check covers every response, not only files.
    pub async fn write_response(
        &mut self,
        req: &mut Request,
        mut resp: Response,
    ) -> anyhow::Result<bool> {
        if !req.mark_replied() {
            return Ok(true);
        }

        conditional::apply(req, &mut resp);

        let keep_alive = decide_keep_alive(req, &resp);
        if keep_alive {
            resp.set_header("Connection", "Keep-Alive");
            resp.set_header(
                "Keep-Alive",
                format!("timeout={}", self.server.config.server.keep_alive_secs),
            );
        } else {
            resp.set_header("Connection", "Close");
        }

        let head_only = req.method == Method::HEAD;
        resp.finalize(head_only);

        let mut writer = ResponseWriter::new(&resp, head_only);
        writer.write_to_stream(&mut self.stream).await?;

        Ok(keep_alive)
    }

    /// Writes an error response for a protocol failure, before a full
    /// Request object exists.
    async fn send_error(&mut self, status: u16) -> anyhow::Result<()> {
        let mut resp = Response::status(status);
        resp.set_header("Connection", "Close");
        resp.finalize(false);

        let mut writer = ResponseWriter::new(&resp, false);
        writer.write_to_stream(&mut self.stream).await
    }

    /// Reads more bytes, bounded by the keep-alive idle timeout.
    ///
    /// Returns `false` when the peer closed or idled out.
    async fn fill(&mut self) -> anyhow::Result<bool> {
        let idle = Duration::from_secs(self.server.config.server.keep_alive_secs);

        match tokio::time::timeout(idle, self.stream.read_buf(&mut self.buf)).await {
            Ok(Ok(n)) => Ok(n > 0),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::debug!("idle timeout, closing connection");
                Ok(false)
            }
        }
    }
}

/// Keep-alive decision for a completed transaction.
///
/// Closed when: the handler forced it, the status is an error, the client
/// asked for close, or the protocol is HTTP/1.0 without an explicit
/// `Connection: keep-alive`.
pub fn decide_keep_alive(req: &Request, resp: &Response) -> bool {
    if resp.force_close || resp.status >= 400 {
        return false;
    }

    match req.header("connection") {
        Some(v) if v.eq_ignore_ascii_case("close") => false,
        Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
        _ => req.version == Version::Http11,
    }
}
