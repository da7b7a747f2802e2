use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::server::Server;

/// Accept loop: one spawned task per connection.
///
/// Connection tasks are independent state machines; an error in one is
/// logged and releases only that connection.
pub async fn run(server: Arc<Server>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&server.config.server.listen).await?;
    info!("Listening on {}", server.config.server.listen);

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!(peer = %peer, "accepted connection");

        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, server);
            if let Err(e) = conn.run().await {
                tracing::debug!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }
}
