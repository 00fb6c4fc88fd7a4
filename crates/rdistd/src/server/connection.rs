//! Connection handler for individual client connections.
//!
//! Each accepted connection gets a `ConnectionHandler` that:
//! - Reads exactly one handshake line (bounded by the handshake timeout)
//! - Hands the connection to a consumer or monitor service
//! - Answers anything else with `invalid request` and closes
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors end only this connection and are logged by the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use rdist_protocol::{encode_line, strip_line_ending, FrameError, Handshake, INVALID_REQUEST, MAX_LINE_LEN};

use crate::consumer::ConsumerService;
use crate::context::ServerContext;
use crate::monitor::MonitorService;

/// Handshake dispatcher for a single accepted connection.
pub struct ConnectionHandler {
    stream: TcpStream,

    /// Remote address, for log fields
    peer: SocketAddr,

    ctx: Arc<ServerContext>,

    /// Accept-order number of this connection
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>, connection_number: u64) -> Self {
        Self {
            stream,
            peer,
            ctx,
            connection_number,
        }
    }

    /// Runs the handshake and then the selected service until disconnect.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let Self {
            stream,
            peer,
            ctx,
            connection_number,
        } = self;

        debug!(connection = connection_number, peer = %peer, "New client connected");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = connection_number, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, mut writer) = stream.into_split();
        let mut reader = LineReader::new(reader);

        let line = match timeout(ctx.config().handshake_timeout, reader.next_line()).await {
            Ok(line) => line?,
            Err(_) => return Err(ConnectionError::HandshakeTimeout),
        };
        let line = line.unwrap_or_else(|| {
            debug!(connection = connection_number, "Client closed before handshake");
            String::new()
        });

        match Handshake::parse(&line) {
            Some(Handshake::Consumer) => {
                let service = ConsumerService::register(ctx, reader, writer).await;
                debug!(connection = connection_number, consumer = %service.id(), "Consumer handshake completed");
                service.run().await
            }
            Some(Handshake::Monitor) => {
                let service = MonitorService::register(ctx, reader, Box::new(writer)).await;
                debug!(connection = connection_number, monitor = %service.id(), "Monitor handshake completed");
                service.run().await
            }
            None => {
                warn!(connection = connection_number, peer = %peer, token = %line, "Invalid handshake");
                write_line(&mut writer, INVALID_REQUEST, ctx.config().write_timeout).await?;
                writer
                    .shutdown()
                    .await
                    .map_err(|e| ConnectionError::Io(e.to_string()))?;
                Err(ConnectionError::InvalidHandshake(line))
            }
        }
    }
}

/// Line reader over the read half of a connection.
///
/// Bytes of a partially received line are kept across calls, so
/// [`LineReader::next_line`] is cancel safe and can race other events in
/// `select!`. Invalid UTF-8 is replaced rather than rejected; such a line
/// simply matches no command.
pub struct LineReader<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            partial: Vec::new(),
        }
    }

    /// Reads one command line with its terminator stripped.
    ///
    /// Returns `None` on orderly close. A final line without terminator is
    /// still returned. Lines longer than [`MAX_LINE_LEN`] end the connection.
    pub async fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let remaining = MAX_LINE_LEN.saturating_sub(self.partial.len());
        let mut limited = (&mut self.reader).take(remaining as u64);

        limited
            .read_until(b'\n', &mut self.partial)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if self.partial.last() != Some(&b'\n') {
            if self.partial.len() >= MAX_LINE_LEN {
                return Err(ConnectionError::MessageTooLarge {
                    size: self.partial.len(),
                    max: MAX_LINE_LEN,
                });
            }
            if self.partial.is_empty() {
                return Ok(None);
            }
        }

        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&bytes);
        Ok(Some(strip_line_ending(&line).to_string()))
    }
}

/// Writes `body` as one line and flushes, within `write_timeout`.
pub async fn write_line<W>(writer: &mut W, body: &str, write_timeout: Duration) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(body)?;

    match timeout(write_timeout, async {
        writer.write_all(&line).await?;
        writer.flush().await
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that end a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid handshake: {0:?}")]
    InvalidHandshake(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Handshake timeout")]
    HandshakeTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Too many pending commands (max: {max})")]
    Backlog { max: usize },

    #[error(transparent)]
    Frame(#[from] FrameError),
}
