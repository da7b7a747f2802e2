use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::response::{Response, reason_phrase};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response to wire bytes.
///
/// Headers with a suppressed (`None`) value are skipped. For HEAD requests
/// entity headers are written but the body is not.
pub fn serialize_response(resp: &Response, head_only: bool) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status,
        reason_phrase(resp.status)
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        let Some(v) = v else { continue };
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    if !head_only && let Some(body) = &resp.body {
        buf.extend_from_slice(body);
    }

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response, head_only: bool) -> Self {
        Self {
            buffer: serialize_response(response, head_only),
            written: 0,
        }
    }

    pub async fn write_to_stream(&mut self, stream: &mut TcpStream) -> anyhow::Result<()> {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        Ok(())
    }
}
