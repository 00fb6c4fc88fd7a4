//! rdist Client - consumer and monitor connections
//!
//! This crate provides the client side of the rdist line protocol:
//! - `client` - `ConsumerClient` and `MonitorClient`
//! - `display` - text rendering of monitor snapshots
//! - `error` - client error types

pub mod client;
pub mod display;
pub mod error;

pub use client::{ClientConfig, ConsumerClient, MonitorClient};
pub use display::format_report;
pub use error::{ClientError, Result};
