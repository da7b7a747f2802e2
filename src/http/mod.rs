//! HTTP protocol implementation.
//!
//! A hand-rolled HTTP/1.1 engine: the server owns the TCP socket, parses
//! request bytes incrementally and writes raw response bytes back. No
//! networking framework underneath.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection phase state machine driving parse steps
//! - **`parser`**: pure parse functions over the read buffer
//! - **`request`**: request model, builder and body decoding
//! - **`response`**: response model, status table and error pages
//! - **`conditional`**: If-None-Match / If-Modified-Since evaluation
//! - **`writer`**: serializes and writes responses to the client
//! - **`mime`**: content-type detection based on file extensions
//!
//! # Connection phases
//!
//! ```text
//! AwaitingRequestLine → AwaitingHeaders → AwaitingBody → Ready
//!         ▲                                                │ dispatch + write
//!         └──────────────── keep-alive ────────────────────┘
//!
//! (any protocol error) → Ignoring: drain input until the peer closes
//! ```
//!
//! Each readiness event performs exactly the read operation valid for the
//! current phase; nothing blocks the task between events.

pub mod conditional;
pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
