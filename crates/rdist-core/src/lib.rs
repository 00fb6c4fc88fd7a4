//! rdist Core - Shared domain types for the resource distribution server
//!
//! This crate provides the domain types shared between the server (rdistd),
//! the wire protocol (rdist-protocol) and the client library (rdist-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod buffer;
pub mod error;
pub mod resource;
pub mod state;

// Re-exports for convenience
pub use buffer::ResourceBuffer;
pub use error::{DomainError, DomainResult};
pub use resource::{ConsumerId, MonitorId, ProducerId, Resource, ResourceId};
pub use state::{ConsumerState, ProducerState};
