//! Snapshot collection.
//!
//! Lock order is consumer registry, then buffer. Consumer and producer
//! counters change only under the buffer lock, so holding both yields a
//! report in which counts and buffer contents agree.

use chrono::Utc;

use rdist_protocol::{Report, ResourceReport, SnapshotDocument};

use crate::context::ServerContext;

/// Takes a consistent copy of consumers, producers and buffer contents.
pub async fn collect(ctx: &ServerContext) -> SnapshotDocument {
    let consumers = ctx.consumers().lock().await;
    let buffer = ctx.buffer().lock().await;

    let report = Report {
        consumers: consumers.values().map(|entry| entry.report()).collect(),
        producers: ctx.producers().iter().map(|status| status.report()).collect(),
        buffer: buffer.buffer().iter().map(ResourceReport::from).collect(),
        events: Vec::new(),
        generated_at: Utc::now(),
    };

    drop(buffer);
    drop(consumers);
    SnapshotDocument::new(report)
}
