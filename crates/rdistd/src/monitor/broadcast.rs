//! Snapshot fan-out to monitors.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::context::ServerContext;
use crate::monitor::{Delivery, MonitorEntry};

/// Starts a broadcast on a fresh coordinator task and returns at once.
pub fn trigger(ctx: &Arc<ServerContext>) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(coordinate(ctx));
}

/// Walks the monitor registry and spawns one delivery worker per entry
/// that has no push in flight.
///
/// The registry lock is held for the walk only; scheduling is a flag swap
/// and never waits on an entry.
pub async fn coordinate(ctx: Arc<ServerContext>) {
    let monitors = ctx.monitors().lock().await;

    for entry in monitors.values() {
        if !entry.try_schedule() {
            trace!(monitor = %entry.id(), "Push already scheduled, coalescing");
            continue;
        }
        tokio::spawn(deliver(Arc::clone(&ctx), Arc::clone(entry)));
    }
}

/// Waits for `entry` to ask for data, then pushes a fresh snapshot.
///
/// If the monitor disconnects while we wait, this worker finishes the
/// deferred removal instead.
pub async fn deliver(ctx: Arc<ServerContext>, entry: Arc<MonitorEntry>) {
    let id = entry.id();

    match entry.wait_ready().await {
        Delivery::Send(mut state) => {
            let document = ctx.snapshot().await;
            let bytes = match document.render() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(monitor = %id, error = %e, "Failed to render snapshot");
                    return;
                }
            };

            let write_timeout = ctx.config().write_timeout;
            let failure = match timeout(write_timeout, state.send(&bytes)).await {
                Ok(Ok(())) => {
                    debug!(
                        monitor = %id,
                        buffered = document.report.buffer.len(),
                        "Pushed snapshot"
                    );
                    return;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "write timed out".to_string(),
            };

            // Part of the document may be on the wire; the stream is unusable.
            warn!(monitor = %id, error = %failure, "Snapshot push failed, dropping monitor");
            if !state.retire() {
                return;
            }
            if timeout(write_timeout, state.shutdown()).await.is_err() {
                debug!(monitor = %id, "Shutdown of monitor stream timed out");
            }
            drop(state);

            entry.evict();
            ctx.monitors().remove(id.get()).await;
            ctx.broadcast();
        }
        Delivery::Remove => {
            ctx.monitors().remove(id.get()).await;
            ctx.broadcast();
            debug!(monitor = %id, "Worker completed deferred monitor removal");
        }
        Delivery::Abandon => {
            trace!(monitor = %id, "Monitor already removed, dropping push");
        }
    }
}
