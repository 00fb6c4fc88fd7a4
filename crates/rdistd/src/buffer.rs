//! Shared bounded buffer.
//!
//! Wraps the pure [`ResourceBuffer`] in one lock and two conditions:
//! - `room_available`: signalled when a dequeue frees a slot in a full buffer
//! - `not_empty`: signalled when an enqueue fills an empty buffer
//!
//! Waiters register interest before inspecting the buffer under the lock, so
//! a signal sent between the check and the wait is never lost. Every waiter
//! re-checks after waking.

use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::debug;

use rdist_core::{ProducerId, Resource, ResourceBuffer, ResourceId};

/// Buffer contents plus the resource id allocator.
///
/// Ids are minted under the buffer lock, so buffer order and id order agree.
#[derive(Debug)]
pub struct BufferState {
    buffer: ResourceBuffer,
    next_id: u64,
}

impl BufferState {
    pub fn buffer(&self) -> &ResourceBuffer {
        &self.buffer
    }
}

/// Bounded FIFO shared by producers and consumer services.
#[derive(Debug)]
pub struct SharedBuffer {
    state: Mutex<BufferState>,
    room_available: Notify,
    not_empty: Notify,
}

impl SharedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                buffer: ResourceBuffer::new(capacity),
                next_id: 0,
            }),
            room_available: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Acquires the buffer lock, for callers that need a consistent read.
    pub async fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().await
    }

    /// Mints a resource for `producer` and enqueues it, waiting for room.
    ///
    /// `on_wait` runs (under the lock) each time the buffer is found full,
    /// `on_produced` runs once under the lock right after the enqueue.
    pub async fn produce<W, P>(&self, producer: ProducerId, mut on_wait: W, on_produced: P) -> Resource
    where
        W: FnMut(),
        P: FnOnce(&Resource),
    {
        loop {
            let notified = self.room_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let was_empty = state.buffer.is_empty();
                let resource = Resource::new(ResourceId::new(state.next_id), producer);

                if state.buffer.enqueue(resource).is_ok() {
                    state.next_id += 1;
                    on_produced(&resource);
                    debug!(
                        resource = %resource.id,
                        producer = %producer,
                        count = state.buffer.len(),
                        "Enqueued resource"
                    );
                    drop(state);

                    if was_empty {
                        self.not_empty.notify_waiters();
                    }
                    return resource;
                }

                debug!(producer = %producer, "Buffer full, producer waiting");
                on_wait();
            }

            notified.await;
        }
    }

    /// Dequeues the oldest resource, waiting until one is available.
    ///
    /// `on_wait` runs (under the lock) each time the buffer is found empty,
    /// `on_taken` runs once under the lock right after the dequeue.
    ///
    /// Cancel-safe: dropping the future never loses a resource.
    pub async fn take<W, T>(&self, mut on_wait: W, on_taken: T) -> Resource
    where
        W: FnMut(),
        T: FnOnce(&Resource),
    {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let was_full = state.buffer.is_full();

                if let Ok(resource) = state.buffer.dequeue() {
                    on_taken(&resource);
                    debug!(
                        resource = %resource.id,
                        count = state.buffer.len(),
                        "Dequeued resource"
                    );
                    drop(state);

                    if was_full {
                        self.room_available.notify_waiters();
                    }
                    return resource;
                }

                on_wait();
            }

            notified.await;
        }
    }

    /// Copies the queued resources, head first.
    pub async fn contents(&self) -> Vec<Resource> {
        self.state.lock().await.buffer.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }
}
