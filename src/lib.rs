//! Beacon - embedded HTTP/1.1 server for the bot's REST API and web UI.
//!
//! Owns the listening socket, parses requests itself and writes raw response
//! bytes back; routing, authentication and static files on top.

pub mod auth;
pub mod config;
pub mod files;
pub mod http;
pub mod router;
pub mod server;
