//! Resource descriptor format: `rid:<id>;produced_by:<producer>;`

use rdist_core::{ProducerId, Resource, ResourceId};
use thiserror::Error;

/// Errors parsing a resource descriptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid resource descriptor: {0:?}")]
    InvalidDescriptor(String),

    #[error("Invalid {field} in descriptor: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Formats the reply sent to a consumer for a dequeued resource.
pub fn format_resource(resource: &Resource) -> String {
    format!("rid:{};produced_by:{};", resource.id, resource.produced_by)
}

/// Parses a descriptor produced by [`format_resource`].
pub fn parse_resource(line: &str) -> Result<Resource, ParseError> {
    let invalid = || ParseError::InvalidDescriptor(line.to_string());

    let body = line.strip_suffix(';').ok_or_else(invalid)?;
    let mut parts = body.split(';');

    let id = parts
        .next()
        .and_then(|p| p.strip_prefix("rid:"))
        .ok_or_else(invalid)?;
    let producer = parts
        .next()
        .and_then(|p| p.strip_prefix("produced_by:"))
        .ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    let id = id.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        field: "rid",
        value: id.to_string(),
    })?;
    let producer = producer
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidNumber {
            field: "produced_by",
            value: producer.to_string(),
        })?;

    Ok(Resource::new(ResourceId::new(id), ProducerId::new(producer)))
}
