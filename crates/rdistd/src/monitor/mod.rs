//! Monitor services and snapshot broadcast.
//!
//! Monitors ask for data with `report` and receive snapshots pushed
//! asynchronously whenever server state changes.
//!
//! # Delivery Model
//!
//! ```text
//!  state change ──▶ coordinator task (registry lock, never blocks)
//!                        │ per entry: pushScheduled? skip : spawn
//!                        ▼
//!                  worker task (entry lock)
//!                   wait until ready ──▶ render + write snapshot
//!                        │
//!                        └─ entry pending delete ──▶ finish removal
//! ```
//!
//! Traversal holds only the registry lock and never waits on a monitor;
//! delivery holds only the entry lock. A slow monitor therefore delays
//! nobody but itself, and at most one worker per monitor is in flight.

pub mod broadcast;
mod entry;
mod service;

pub use entry::{Delivery, EntryState, Lifecycle, MonitorEntry, MonitorWriter, Removal};
pub use service::MonitorService;
