//! Shared server state.
//!
//! One `ServerContext` is created per server and handed (as `Arc`) to every
//! producer, service and broadcast task. It replaces process-wide globals:
//! configuration, the buffer, producer states and both registries all live
//! here.

use std::sync::Arc;

use rdist_core::ProducerId;
use rdist_protocol::SnapshotDocument;

use crate::buffer::SharedBuffer;
use crate::config::ServerConfig;
use crate::consumer::ConsumerEntry;
use crate::monitor::{broadcast, MonitorEntry};
use crate::producer::ProducerStatus;
use crate::registry::Registry;
use crate::snapshot;

/// State shared by every task of one server.
pub struct ServerContext {
    config: ServerConfig,
    buffer: SharedBuffer,
    producers: Vec<Arc<ProducerStatus>>,
    consumers: Registry<ConsumerEntry>,
    monitors: Registry<MonitorEntry>,
}

impl ServerContext {
    /// Builds the context, with one producer status slot per configured producer.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let producers = (0..config.producer_count as u64)
            .map(|id| Arc::new(ProducerStatus::new(ProducerId::new(id))))
            .collect();

        Arc::new(Self {
            buffer: SharedBuffer::new(config.buffer_capacity),
            producers,
            consumers: Registry::new("consumer"),
            monitors: Registry::new("monitor"),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn producers(&self) -> &[Arc<ProducerStatus>] {
        &self.producers
    }

    pub fn consumers(&self) -> &Registry<ConsumerEntry> {
        &self.consumers
    }

    pub fn monitors(&self) -> &Registry<MonitorEntry> {
        &self.monitors
    }

    /// Schedules a snapshot push to every monitor. Never blocks the caller.
    pub fn broadcast(self: &Arc<Self>) {
        broadcast::trigger(self);
    }

    /// Takes a consistent copy of the current state.
    pub async fn snapshot(&self) -> SnapshotDocument {
        snapshot::collect(self).await
    }
}
