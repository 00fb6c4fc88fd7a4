//! Consumer services.
//!
//! One `ConsumerService` runs per consumer connection:
//!
//! ```text
//! Idle ──"consume"──▶ Hungry ──resource available──▶ Consuming ──delays──▶ Idle
//!  │
//!  └──other command──▶ "unrecognized client command." (stays Idle)
//! ```
//!
//! An empty buffer is not an error: `Hungry` lasts until a producer
//! enqueues. Disconnect (or a read error) deregisters the service and ends
//! only this connection. While `Hungry` the connection is still read, so a
//! peer that leaves is noticed even if it pipelined further commands; those
//! are queued and served in order afterwards.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::sleep;
use tracing::{debug, info};

use rdist_core::{ConsumerId, ConsumerState, Resource};
use rdist_protocol::{format_resource, ConsumerCommand, ConsumerReport, Handshake, UNRECOGNIZED_COMMAND};

use crate::context::ServerContext;
use crate::server::{write_line, ConnectionError, LineReader};

/// Commands a hungry consumer may queue before the connection is dropped.
pub const MAX_PENDING_COMMANDS: usize = 64;

/// Registry entry of a consumer connection.
///
/// Written by the owning service, read by snapshot collection.
#[derive(Debug)]
pub struct ConsumerEntry {
    id: ConsumerId,
    state: AtomicU8,
    consumed: AtomicU64,
}

impl ConsumerEntry {
    pub fn new(id: ConsumerId) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConsumerState::Idle.code()),
            consumed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::try_from(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Stores `state`, returning true if it differs from the previous one.
    fn set_state(&self, state: ConsumerState) -> bool {
        self.state.swap(state.code(), Ordering::AcqRel) != state.code()
    }

    pub fn consumed_count(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    pub fn report(&self) -> ConsumerReport {
        ConsumerReport {
            id: self.id,
            resources_consumed: self.consumed_count(),
            status: self.state(),
        }
    }
}

/// Per-connection consumer worker.
pub struct ConsumerService<R, W> {
    entry: Arc<ConsumerEntry>,
    ctx: Arc<ServerContext>,
    reader: LineReader<R>,
    writer: W,

    /// Commands read ahead while hungry
    pending: VecDeque<String>,
}

impl<R, W> ConsumerService<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates the service and registers it in the consumer registry.
    pub async fn register(ctx: Arc<ServerContext>, reader: LineReader<R>, writer: W) -> Self {
        let id = ConsumerId::new(ctx.consumers().allocate_id());
        let entry = Arc::new(ConsumerEntry::new(id));
        ctx.consumers().insert(id.get(), Arc::clone(&entry)).await;
        ctx.broadcast();

        info!(consumer = %id, "Consumer registered");

        Self {
            entry,
            ctx,
            reader,
            writer,
            pending: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.entry.id()
    }

    /// Serves the connection until the peer leaves, then deregisters.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.serve().await;

        self.ctx.consumers().remove(self.entry.id().get()).await;
        self.ctx.broadcast();

        match &result {
            Ok(()) => info!(consumer = %self.entry.id(), "Consumer disconnected"),
            Err(e) => info!(consumer = %self.entry.id(), error = %e, "Consumer connection closed"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let write_timeout = self.ctx.config().write_timeout;
        write_line(&mut self.writer, Handshake::Consumer.token(), write_timeout).await?;

        loop {
            self.transition(ConsumerState::Idle);

            let Some(line) = self.next_command().await? else {
                return Ok(());
            };

            match ConsumerCommand::parse(&line) {
                ConsumerCommand::Consume => {
                    let Some(resource) = self.acquire().await? else {
                        debug!(consumer = %self.entry.id(), "Peer left while hungry");
                        return Ok(());
                    };
                    self.deliver(resource).await?;
                }
                ConsumerCommand::Unrecognized(command) => {
                    debug!(consumer = %self.entry.id(), command = %command, "Unrecognized command");
                    write_line(&mut self.writer, UNRECOGNIZED_COMMAND, write_timeout).await?;
                }
            }
        }
    }

    async fn next_command(&mut self) -> Result<Option<String>, ConnectionError> {
        match self.pending.pop_front() {
            Some(line) => Ok(Some(line)),
            None => self.reader.next_line().await,
        }
    }

    /// Waits for a resource. Returns `None` if the peer closes first.
    async fn acquire(&mut self) -> Result<Option<Resource>, ConnectionError> {
        self.transition(ConsumerState::Hungry);

        let entry = &self.entry;
        let taken = tokio::select! {
            biased;
            closed = read_ahead(&mut self.reader, &mut self.pending) => {
                closed?;
                None
            }
            resource = self.ctx.buffer().take(|| {}, |_| {
                entry.set_state(ConsumerState::Consuming);
                entry.consumed.fetch_add(1, Ordering::AcqRel);
            }) => Some(resource),
        };

        if taken.is_some() {
            self.ctx.broadcast();
        }
        Ok(taken)
    }

    async fn deliver(&mut self, resource: Resource) -> Result<(), ConnectionError> {
        let config = self.ctx.config();
        let (write_timeout, consume_delay, rest) =
            (config.write_timeout, config.consume_delay, config.consumer_rest);

        write_line(&mut self.writer, &format_resource(&resource), write_timeout).await?;
        debug!(
            consumer = %self.entry.id(),
            resource = %resource.id,
            consumed = self.entry.consumed_count(),
            "Consumed resource"
        );

        sleep(consume_delay).await;
        self.transition(ConsumerState::Idle);
        sleep(rest).await;
        Ok(())
    }

    fn transition(&self, state: ConsumerState) {
        if self.entry.set_state(state) {
            self.ctx.broadcast();
        }
    }
}

/// Queues commands that arrive while hungry. Resolves once the peer has
/// closed its side.
async fn read_ahead<R>(reader: &mut LineReader<R>, pending: &mut VecDeque<String>) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = reader.next_line().await? {
        if pending.len() >= MAX_PENDING_COMMANDS {
            return Err(ConnectionError::Backlog {
                max: MAX_PENDING_COMMANDS,
            });
        }
        pending.push_back(line);
    }
    Ok(())
}
