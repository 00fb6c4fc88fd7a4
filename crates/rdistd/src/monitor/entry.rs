//! Monitor registry entry and its removal handshake.
//!
//! The entry outlives registry membership while a broadcast worker may still
//! be waiting on it. Removal is a two-party handoff decided under the entry
//! lock:
//!
//! - no worker waiting: the disconnecting service marks the entry `Gone` and
//!   unregisters it itself
//! - a worker waiting: the service marks it `PendingDelete` and wakes the
//!   worker, which marks it `Gone` and unregisters it
//!
//! A failed or timed-out push may leave half a document on the wire. The
//! worker then retires the entry itself (`Live -> Gone`), shuts the write
//! half down, unregisters it and evicts the service.
//!
//! Exactly one party observes the `Live -> Gone` or `PendingDelete -> Gone`
//! transition, so the unregister happens exactly once, and nothing writes to
//! an entry that is not `Live`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio_util::sync::CancellationToken;

use rdist_core::MonitorId;

/// Write half of a monitor connection.
pub type MonitorWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Removal state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered and connected
    Live,

    /// Disconnected while a worker waits; the worker finishes removal
    PendingDelete,

    /// Removed (or being removed) from the registry
    Gone,
}

/// Who has to unregister the entry after [`MonitorEntry::begin_removal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The caller unregisters now
    Immediate,

    /// A waiting worker was woken and will unregister
    Deferred,

    /// Removal was already under way
    AlreadyRemoved,
}

/// Outcome of waiting for a monitor to become ready.
pub enum Delivery<'a> {
    /// Ready and live: write the snapshot through the held guard
    Send(MutexGuard<'a, EntryState>),

    /// The monitor left while we waited: unregister it
    Remove,

    /// Someone else already removed the entry
    Abandon,
}

/// Entry state guarded by the entry lock.
pub struct EntryState {
    ready: bool,
    awaiting_ready: bool,
    lifecycle: Lifecycle,
    writer: MonitorWriter,
}

impl EntryState {
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Writes `bytes` and flushes.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Marks a live entry `Gone` after its stream became unusable.
    ///
    /// Returns false if removal was already under way.
    pub fn retire(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Live {
            return false;
        }
        self.lifecycle = Lifecycle::Gone;
        self.awaiting_ready = false;
        true
    }

    /// Shuts the write half down.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// A registered monitor connection.
pub struct MonitorEntry {
    id: MonitorId,
    push_scheduled: AtomicBool,
    state: Mutex<EntryState>,
    ready_signal: Notify,

    /// Fired when a broadcast worker dropped the connection
    evicted: CancellationToken,
}

impl MonitorEntry {
    pub fn new(id: MonitorId, writer: MonitorWriter) -> Self {
        Self {
            id,
            push_scheduled: AtomicBool::new(false),
            state: Mutex::new(EntryState {
                ready: false,
                awaiting_ready: false,
                lifecycle: Lifecycle::Live,
                writer,
            }),
            ready_signal: Notify::new(),
            evicted: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    /// Claims the single push slot of this entry.
    ///
    /// Returns false if a push is already scheduled, so back-to-back
    /// broadcasts collapse into one delivery of the latest state.
    pub fn try_schedule(&self) -> bool {
        self.push_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_push_scheduled(&self) -> bool {
        self.push_scheduled.load(Ordering::Acquire)
    }

    /// Returns true while a worker is parked waiting for `report`.
    pub async fn is_awaiting_ready(&self) -> bool {
        self.state.lock().await.awaiting_ready
    }

    /// Locks the entry, e.g. to write a direct reply.
    pub async fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().await
    }

    /// Records a `report` request and wakes a waiting worker.
    pub async fn mark_ready(&self) {
        let mut state = self.state.lock().await;
        state.ready = true;
        drop(state);
        self.ready_signal.notify_waiters();
    }

    /// Waits until the monitor is ready or gone.
    ///
    /// On `Send` the ready flag and the push slot are already reset and the
    /// entry lock is still held, serializing writes to this monitor.
    pub async fn wait_ready(&self) -> Delivery<'_> {
        let mut state = self.state.lock().await;

        loop {
            match state.lifecycle {
                Lifecycle::PendingDelete => {
                    state.lifecycle = Lifecycle::Gone;
                    state.awaiting_ready = false;
                    return Delivery::Remove;
                }
                Lifecycle::Gone => {
                    state.awaiting_ready = false;
                    return Delivery::Abandon;
                }
                Lifecycle::Live if state.ready => {
                    state.ready = false;
                    state.awaiting_ready = false;
                    self.push_scheduled.store(false, Ordering::Release);
                    return Delivery::Send(state);
                }
                Lifecycle::Live => {}
            }

            state.awaiting_ready = true;
            let notified = self.ready_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);

            notified.await;
            state = self.state.lock().await;
        }
    }

    /// Tells the owning service its connection was dropped.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Resolves once [`MonitorEntry::evict`] has been called.
    pub async fn evicted(&self) {
        self.evicted.cancelled().await
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Starts removal on disconnect. See the module docs for the protocol.
    pub async fn begin_removal(&self) -> Removal {
        let mut state = self.state.lock().await;

        match state.lifecycle {
            Lifecycle::Live if state.awaiting_ready => {
                state.lifecycle = Lifecycle::PendingDelete;
                drop(state);
                self.ready_signal.notify_waiters();
                Removal::Deferred
            }
            Lifecycle::Live => {
                state.lifecycle = Lifecycle::Gone;
                Removal::Immediate
            }
            Lifecycle::PendingDelete | Lifecycle::Gone => Removal::AlreadyRemoved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::time::timeout;

    const STEP: Duration = Duration::from_secs(5);

    fn entry() -> (Arc<MonitorEntry>, tokio::io::DuplexStream) {
        let (client, server) = duplex(4096);
        (Arc::new(MonitorEntry::new(MonitorId::new(0), Box::new(server))), client)
    }

    /// Runs `wait_ready` in a task, reporting which outcome it saw.
    fn spawn_waiter(entry: &Arc<MonitorEntry>) -> tokio::task::JoinHandle<&'static str> {
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            match entry.wait_ready().await {
                Delivery::Send(mut state) => {
                    state.send(b"snapshot\n").await.unwrap();
                    "send"
                }
                Delivery::Remove => "remove",
                Delivery::Abandon => "abandon",
            }
        })
    }

    async fn wait_until_awaiting(entry: &MonitorEntry) {
        timeout(STEP, async {
            while !entry.is_awaiting_ready().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_schedule_coalesces() {
        let (entry, _client) = entry();
        assert!(entry.try_schedule());
        assert!(!entry.try_schedule());
        assert!(entry.is_push_scheduled());
    }

    #[tokio::test]
    async fn test_ready_before_wait_sends_immediately() {
        let (entry, mut client) = entry();
        entry.try_schedule();
        entry.mark_ready().await;

        let outcome = timeout(STEP, spawn_waiter(&entry)).await.unwrap().unwrap();
        assert_eq!(outcome, "send");
        assert!(!entry.is_push_scheduled());

        let mut buf = [0u8; 9];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"snapshot\n");
    }

    #[tokio::test]
    async fn test_waiter_blocks_until_report() {
        let (entry, _client) = entry();
        let waiter = spawn_waiter(&entry);
        wait_until_awaiting(&entry).await;
        assert!(!waiter.is_finished());

        entry.mark_ready().await;
        assert_eq!(timeout(STEP, waiter).await.unwrap().unwrap(), "send");
        assert!(!entry.lock().await.ready);
    }

    #[tokio::test]
    async fn test_removal_without_waiter_is_immediate() {
        let (entry, _client) = entry();
        assert_eq!(entry.begin_removal().await, Removal::Immediate);
        assert_eq!(entry.lock().await.lifecycle(), Lifecycle::Gone);
        assert_eq!(entry.begin_removal().await, Removal::AlreadyRemoved);

        let outcome = timeout(STEP, spawn_waiter(&entry)).await.unwrap().unwrap();
        assert_eq!(outcome, "abandon");
    }

    #[tokio::test]
    async fn test_removal_with_waiter_is_deferred_to_worker() {
        let (entry, mut client) = entry();
        let waiter = spawn_waiter(&entry);
        wait_until_awaiting(&entry).await;

        assert_eq!(entry.begin_removal().await, Removal::Deferred);
        assert_eq!(timeout(STEP, waiter).await.unwrap().unwrap(), "remove");
        assert_eq!(entry.lock().await.lifecycle(), Lifecycle::Gone);
        assert_eq!(entry.begin_removal().await, Removal::AlreadyRemoved);

        // Nothing was written to the departed monitor.
        drop(entry);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_retired_entry_is_not_removed_again() {
        let (entry, mut client) = entry();
        {
            let mut state = entry.lock().await;
            assert!(state.retire());
            assert!(!state.retire());
            state.shutdown().await.unwrap();
        }
        assert_eq!(entry.begin_removal().await, Removal::AlreadyRemoved);

        let mut rest = Vec::new();
        timeout(STEP, client.read_to_end(&mut rest)).await.unwrap().unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_ready_after_removal_does_not_send() {
        let (entry, _client) = entry();
        let waiter = spawn_waiter(&entry);
        wait_until_awaiting(&entry).await;

        assert_eq!(entry.begin_removal().await, Removal::Deferred);
        entry.mark_ready().await;
        assert_eq!(timeout(STEP, waiter).await.unwrap().unwrap(), "remove");
    }
}
