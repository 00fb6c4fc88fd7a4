//! Error types for the rdist clients.

use std::io;

use thiserror::Error;

use rdist_protocol::{FrameError, ParseError, SnapshotError};

/// Client-side errors.
///
/// Connection errors carry the address so the user can check whether the
/// server is running on the expected host and port.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// The server did not answer in time.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The server answered the handshake with something other than its echo.
    #[error("Handshake rejected: {0:?}")]
    HandshakeRejected(String),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The server did not understand a command.
    #[error("Server rejected command: {0:?}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Failed to parse resource: {0}")]
    Resource(#[from] ParseError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
