//! Per-connection monitor service.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::time::timeout;
use tracing::{debug, info};

use rdist_core::MonitorId;
use rdist_protocol::{encode_line, Handshake, MonitorCommand, UNRECOGNIZED_COMMAND};

use crate::context::ServerContext;
use crate::monitor::{Lifecycle, MonitorEntry, MonitorWriter, Removal};
use crate::server::{ConnectionError, LineReader};

/// Reads `report` requests from one monitor connection.
///
/// The write half lives in the registry entry so broadcast workers can push
/// snapshots; direct replies go through the same entry lock.
pub struct MonitorService<R> {
    entry: Arc<MonitorEntry>,
    ctx: Arc<ServerContext>,
    reader: LineReader<R>,
}

impl<R> MonitorService<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates the service and registers it in the monitor registry.
    pub async fn register(ctx: Arc<ServerContext>, reader: LineReader<R>, writer: MonitorWriter) -> Self {
        let id = MonitorId::new(ctx.monitors().allocate_id());
        let entry = Arc::new(MonitorEntry::new(id, writer));
        ctx.monitors().insert(id.get(), Arc::clone(&entry)).await;
        ctx.broadcast();

        info!(monitor = %id, "Monitor registered");

        Self { entry, ctx, reader }
    }

    pub fn id(&self) -> MonitorId {
        self.entry.id()
    }

    /// Serves the connection until the peer leaves or a failed push evicts
    /// it, then starts removal.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.serve().await;
        let id = self.entry.id();

        match self.entry.begin_removal().await {
            Removal::Immediate => {
                self.ctx.monitors().remove(id.get()).await;
                self.ctx.broadcast();
            }
            Removal::Deferred => {
                debug!(monitor = %id, "Removal handed to waiting worker");
            }
            Removal::AlreadyRemoved => {}
        }

        match &result {
            Ok(()) => info!(monitor = %id, "Monitor disconnected"),
            Err(e) => info!(monitor = %id, error = %e, "Monitor connection closed"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        self.reply(Handshake::Monitor.token()).await?;

        loop {
            let line = tokio::select! {
                line = self.reader.next_line() => line?,
                _ = self.entry.evicted() => {
                    debug!(monitor = %self.entry.id(), "Monitor evicted after failed push");
                    return Ok(());
                }
            };
            let Some(line) = line else {
                return Ok(());
            };

            match MonitorCommand::parse(&line) {
                MonitorCommand::Report => {
                    debug!(monitor = %self.entry.id(), "Monitor ready for data");
                    self.entry.mark_ready().await;
                }
                MonitorCommand::Unrecognized(command) => {
                    debug!(monitor = %self.entry.id(), command = %command, "Unrecognized command");
                    self.reply(UNRECOGNIZED_COMMAND).await?;
                }
            }
        }
    }

    /// Writes a direct reply, serialized with snapshot pushes.
    async fn reply(&self, body: &str) -> Result<(), ConnectionError> {
        let line = encode_line(body)?;
        let mut state = self.entry.lock().await;
        if state.lifecycle() != Lifecycle::Live {
            return Ok(());
        }

        match timeout(self.ctx.config().write_timeout, state.send(&line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}
