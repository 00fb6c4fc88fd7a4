//! Producer tasks.
//!
//! Each configured producer slot runs an endless cycle:
//!
//! ```text
//! Resting ──rest delay──▶ lock buffer ──full?──▶ Waiting ──room──┐
//!    ▲                         │ no                              │
//!    │                         ▼                                 │
//!    └──produce delay── Producing (enqueue, count++) ◀───────────┘
//! ```
//!
//! Every state change and every enqueue triggers a monitor broadcast.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rdist_core::{ProducerId, ProducerState, Resource};
use rdist_protocol::ProducerReport;

use crate::context::ServerContext;

/// Observable state of one producer slot.
///
/// Written by the producer task, read by snapshot collection.
#[derive(Debug)]
pub struct ProducerStatus {
    id: ProducerId,
    state: AtomicU8,
    produced: AtomicU64,
}

impl ProducerStatus {
    pub fn new(id: ProducerId) -> Self {
        Self {
            id,
            state: AtomicU8::new(ProducerState::Resting.code()),
            produced: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn state(&self) -> ProducerState {
        ProducerState::try_from(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Stores `state`, returning true if it differs from the previous one.
    fn set_state(&self, state: ProducerState) -> bool {
        self.state.swap(state.code(), Ordering::AcqRel) != state.code()
    }

    pub fn produced_count(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }

    pub fn report(&self) -> ProducerReport {
        ProducerReport {
            id: self.id,
            status: self.state(),
            count: self.produced_count(),
        }
    }
}

/// A running producer: its status slot plus the shared context.
pub struct Producer {
    status: Arc<ProducerStatus>,
    ctx: Arc<ServerContext>,
}

impl Producer {
    pub fn new(status: Arc<ProducerStatus>, ctx: Arc<ServerContext>) -> Self {
        Self { status, ctx }
    }

    /// Runs the production cycle until `cancel_token` fires.
    pub async fn run(self, cancel_token: CancellationToken) {
        let rest = self.ctx.config().producer_rest;
        let produce_delay = self.ctx.config().produce_delay;

        debug!(producer = %self.status.id(), "Producer started");

        loop {
            self.transition(ProducerState::Resting);
            if !pause(&cancel_token, rest).await {
                break;
            }

            let produced = tokio::select! {
                _ = cancel_token.cancelled() => None,
                resource = self.produce_once() => Some(resource),
            };
            if produced.is_none() {
                break;
            }

            if !pause(&cancel_token, produce_delay).await {
                break;
            }
        }

        debug!(producer = %self.status.id(), "Producer stopped");
    }

    /// Runs one enqueue step: wait for room if needed, mint, enqueue.
    ///
    /// Leaves the producer in `Producing`.
    pub async fn produce_once(&self) -> Resource {
        let status = &self.status;
        let ctx = &self.ctx;

        let resource = ctx
            .buffer()
            .produce(
                status.id(),
                || {
                    if status.set_state(ProducerState::Waiting) {
                        debug!(producer = %status.id(), "Producer waiting for room");
                        ctx.broadcast();
                    }
                },
                |_| {
                    status.set_state(ProducerState::Producing);
                    status.produced.fetch_add(1, Ordering::AcqRel);
                },
            )
            .await;

        debug!(
            producer = %status.id(),
            resource = %resource.id,
            produced = status.produced_count(),
            "Produced resource"
        );
        ctx.broadcast();
        resource
    }

    fn transition(&self, state: ProducerState) {
        if self.status.set_state(state) {
            self.ctx.broadcast();
        }
    }
}

/// Starts one task per producer slot in the context.
pub fn spawn_producers(
    ctx: &Arc<ServerContext>,
    cancel_token: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let handles: Vec<JoinHandle<()>> = ctx
        .producers()
        .iter()
        .map(|status| {
            let producer = Producer::new(Arc::clone(status), Arc::clone(ctx));
            tokio::spawn(producer.run(cancel_token.clone()))
        })
        .collect();

    info!(count = handles.len(), "Producers started");
    handles
}

/// Sleeps for `duration`; returns false if cancelled first.
async fn pause(cancel_token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
