//! TCP server for rdist.
//!
//! The server:
//! - Listens on the configured TCP port
//! - Starts the producer tasks
//! - Spawns a ConnectionHandler for each accepted client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RdistServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐   handshake:consumer   ┌─────────────────┐
//! │ConnectionHandler│───────────────────────▶│ ConsumerService │
//! │   (per client)  │   handshake:monitor    ├─────────────────┤
//! │                 │───────────────────────▶│ MonitorService  │
//! └─────────────────┘                        └─────────────────┘
//! ```
//!
//! The accept loop never waits on a connection body. A failed `accept` is
//! fatal: it ends the loop and is returned to the caller.

mod connection;

pub use connection::{write_line, ConnectionError, ConnectionHandler, LineReader};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ConfigError, ServerConfig};
use crate::context::ServerContext;
use crate::producer::spawn_producers;

/// TCP front end of one rdist server.
pub struct RdistServer {
    /// State shared with producers and services
    context: Arc<ServerContext>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,
}

impl RdistServer {
    /// Creates a server after validating `config`.
    pub fn new(config: ServerConfig, cancel_token: CancellationToken) -> Result<Self, ServerError> {
        config.validate()?;

        Ok(Self {
            context: ServerContext::new(config),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Binds the listening socket.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.context.config().socket_addr();
        TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })
    }

    /// Binds and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Starts producers and accepts connections on `listener` until the
    /// cancellation token fires or `accept` fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr().ok();
        let config = self.context.config();
        info!(
            addr = ?local_addr,
            capacity = config.buffer_capacity,
            producers = config.producer_count,
            "rdist server listening"
        );

        let producers = spawn_producers(&self.context, &self.cancel_token);

        let result = loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break Ok(());
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let number = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, number);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            break Err(ServerError::Accept(e.to_string()));
                        }
                    }
                }
            }
        };

        // Stops the producers when accept failed on its own.
        self.cancel_token.cancel();
        for handle in producers {
            if let Err(e) = handle.await {
                debug!(error = %e, "Producer task ended abnormally");
            }
        }

        info!("Server stopped");
        result
    }

    /// Hands a fresh connection to its own task.
    fn handle_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr, connection_number: u64) {
        let ctx = Arc::clone(&self.context);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(stream, peer, ctx, connection_number);
            if let Err(e) = handler.run().await {
                debug!(connection = connection_number, peer = %peer, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Failed to accept connection: {0}")]
    Accept(String),
}
