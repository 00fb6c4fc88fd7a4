//! Snapshot document pushed to monitors.
//!
//! The field names below are the wire contract:
//!
//! ```text
//! report {
//!   consumers [ consumer { id, resources_consumed, status } ]
//!   producers [ producer { id, status, count } ]
//!   buffer    [ resource { id, producer } ]
//!   events    [ ]
//! }
//! ```
//!
//! A document travels as one JSON line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rdist_core::{ConsumerId, ConsumerState, ProducerId, ProducerState, Resource, ResourceId};

use crate::frame::strip_line_ending;

/// Errors rendering or parsing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to parse snapshot: {0}")]
    Parse(#[source] serde_json::Error),
}

/// One consumer connection as seen by monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerReport {
    pub id: ConsumerId,
    pub resources_consumed: u64,
    pub status: ConsumerState,
}

/// One producer as seen by monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerReport {
    pub id: ProducerId,
    pub status: ProducerState,
    pub count: u64,
}

/// One queued resource, in buffer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    pub producer: ProducerId,
}

impl From<&Resource> for ResourceReport {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id,
            producer: resource.produced_by,
        }
    }
}

/// Entry of the `events` group. The server currently never emits one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    pub message: String,
}

/// The four report groups plus the time the copy was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub consumers: Vec<ConsumerReport>,
    pub producers: Vec<ProducerReport>,
    pub buffer: Vec<ResourceReport>,
    #[serde(default)]
    pub events: Vec<EventReport>,
    pub generated_at: DateTime<Utc>,
}

/// Top-level document: `{"report": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub report: Report,
}

impl SnapshotDocument {
    pub fn new(report: Report) -> Self {
        Self { report }
    }

    /// Renders the document as a terminated line, ready for the socket.
    ///
    /// Pure: reads `self` only. Snapshots grow with the number of consumers
    /// and are not subject to the inbound command limit.
    pub fn render(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut line = serde_json::to_vec(self).map_err(SnapshotError::Serialize)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parses a line produced by [`SnapshotDocument::render`].
    pub fn parse(line: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(strip_line_ending(line)).map_err(SnapshotError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SnapshotDocument {
        SnapshotDocument::new(Report {
            consumers: vec![ConsumerReport {
                id: ConsumerId::new(0),
                resources_consumed: 3,
                status: ConsumerState::Hungry,
            }],
            producers: vec![ProducerReport {
                id: ProducerId::new(1),
                status: ProducerState::Waiting,
                count: 7,
            }],
            buffer: vec![ResourceReport {
                id: ResourceId::new(12),
                producer: ProducerId::new(1),
            }],
            events: Vec::new(),
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        })
    }

    #[test]
    fn test_render_uses_wire_field_names() {
        let line = sample().render().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        let report = &value["report"];
        assert_eq!(report["consumers"][0]["id"], 0);
        assert_eq!(report["consumers"][0]["resources_consumed"], 3);
        assert_eq!(report["consumers"][0]["status"], 1);
        assert_eq!(report["producers"][0]["status"], 3);
        assert_eq!(report["producers"][0]["count"], 7);
        assert_eq!(report["buffer"][0]["id"], 12);
        assert_eq!(report["buffer"][0]["producer"], 1);
        assert_eq!(report["events"], serde_json::json!([]));
    }

    #[test]
    fn test_render_is_single_line() {
        let line = sample().render().unwrap();
        let newlines = line.iter().filter(|b| **b == b'\n').count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_parse_rendered_document() {
        let doc = sample();
        let line = String::from_utf8(doc.render().unwrap()).unwrap();
        assert_eq!(SnapshotDocument::parse(&line).unwrap(), doc);
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        let line = r#"{"report":{"consumers":[{"id":0,"resources_consumed":0,"status":9}],"producers":[],"buffer":[],"events":[],"generated_at":"2026-01-01T00:00:00Z"}}"#;
        assert!(matches!(
            SnapshotDocument::parse(line),
            Err(SnapshotError::Parse(_))
        ));
    }
}
