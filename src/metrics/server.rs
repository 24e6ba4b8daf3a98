//! # Plain-text metrics exposition endpoint.
//!
//! A deliberately small HTTP/1.1 responder: every request to the bound
//! address receives a `200 OK` with the rendered [`MetricsRegistry`].
//! Request lines and headers are read and discarded; there is no routing.
//!
//! Lifecycle is owned by the root manager's config handling: enabling
//! METRICS starts the server if it is not running, disabling stops it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::metrics::MetricsRegistry;

/// A running exposition endpoint.
pub(crate) struct MetricsServer {
    addr: SocketAddr,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl MetricsServer {
    /// Binds `endpoint` and starts serving the registry.
    ///
    /// Fails with [`RuntimeError::BadConfig`] when the endpoint cannot be
    /// bound, so a config update with an unusable address is rejected as a
    /// whole.
    pub(crate) async fn start(
        endpoint: &str,
        registry: Arc<MetricsRegistry>,
    ) -> Result<Self, RuntimeError> {
        let listener = TcpListener::bind(endpoint)
            .await
            .map_err(|e| RuntimeError::BadConfig {
                reason: format!("cannot bind metrics endpoint '{endpoint}': {e}"),
            })?;
        let addr = listener.local_addr().map_err(|e| RuntimeError::BadConfig {
            reason: format!("metrics endpoint '{endpoint}': {e}"),
        })?;

        let token = CancellationToken::new();
        let accept_token = token.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _peer)) = accepted else { continue };
                        let registry = Arc::clone(&registry);
                        tokio::spawn(async move {
                            let _ = serve_one(stream, &registry).await;
                        });
                    }
                }
            }
        });

        Ok(Self { addr, token, join })
    }

    /// Returns the bound address (useful when the endpoint used port 0).
    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub(crate) async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

/// Answers a single connection with the rendered registry.
async fn serve_one(mut stream: TcpStream, registry: &MetricsRegistry) -> std::io::Result<()> {
    // Drain whatever fits in one read; the response does not depend on it.
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = registry.render();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain; version=0.0.4\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
