//! Domain-specific error types following panic-free policy.

use crate::Resource;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Enqueue attempted while the buffer holds `capacity` resources.
    ///
    /// The rejected resource is handed back so the caller keeps ownership.
    #[error("Buffer full (capacity {capacity}), refusing resource {}", resource.id)]
    BufferFull { capacity: usize, resource: Resource },

    /// Dequeue attempted on an empty buffer
    #[error("Buffer empty")]
    BufferEmpty,

    /// Numeric state code outside the wire enumeration
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
