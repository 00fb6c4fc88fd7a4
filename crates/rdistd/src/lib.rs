//! rdist Server - bounded resource buffer with consumer and monitor services
//!
//! This crate provides the server side of rdist:
//! - `buffer` - the shared bounded buffer with its two wait conditions
//! - `producer` - producer tasks filling the buffer
//! - `consumer` - per-connection consumer services draining it
//! - `monitor` - per-connection monitor services and the broadcast fan-out
//! - `registry` - id-keyed registries of live services
//! - `snapshot` - consistent report collection for monitors
//! - `config` - server settings, TOML file layer and validation
//! - `server` - TCP listener and handshake dispatch
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         rdistd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌────────────┐  produce  ┌──────────────┐  take            │
//! │  │ Producer×N │──────────▶│ SharedBuffer │◀──────────┐      │
//! │  └────────────┘           └──────────────┘           │      │
//! │                                             ┌────────┴────┐ │
//! │  ┌────────────┐  handshake:consumer         │ Consumer    │ │
//! │  │ RdistServer│────────────────────────────▶│ Service×M   │ │
//! │  │ (TCP)      │  handshake:monitor          └─────────────┘ │
//! │  └─────┬──────┘──────────────┐                              │
//! │        │                     ▼                              │
//! │        │              ┌─────────────┐  push  ┌───────────┐  │
//! │        │  any change  │ Monitor     │◀───────│ Broadcast │  │
//! │        └─────────────▶│ Service×K   │        │ workers   │  │
//! │                       └─────────────┘        └───────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A misbehaving client only ever ends its own connection

pub mod buffer;
pub mod config;
pub mod consumer;
pub mod context;
pub mod monitor;
pub mod producer;
pub mod registry;
pub mod server;
pub mod snapshot;

pub use config::{ConfigError, ServerConfig};
pub use context::ServerContext;
pub use server::{RdistServer, ServerError};
