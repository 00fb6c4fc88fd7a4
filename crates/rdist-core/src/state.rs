//! Producer and consumer state machines.
//!
//! Both enumerations travel over the wire as their numeric codes, so the
//! discriminants below are part of the protocol and must not be reordered.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainError;

/// State of a consumer service connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ConsumerState {
    /// Waiting for the next client command
    #[default]
    Idle = 0,

    /// Asked for a resource, blocked until one is available
    Hungry = 1,

    /// Holding a freshly dequeued resource
    Consuming = 2,
}

impl ConsumerState {
    /// Returns the wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns a lowercase label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hungry => "hungry",
            Self::Consuming => "consuming",
        }
    }
}

impl From<ConsumerState> for u8 {
    fn from(state: ConsumerState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for ConsumerState {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Hungry),
            2 => Ok(Self::Consuming),
            other => Err(DomainError::InvalidFieldValue {
                field: "consumer status".to_string(),
                value: other.to_string(),
                expected: "0..=2".to_string(),
            }),
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of a producer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ProducerState {
    /// Sleeping between production cycles
    #[default]
    Resting = 0,

    /// Minting a resource into the buffer
    Producing = 1,

    /// Reserved wire state, not entered by the production loop
    Exporting = 2,

    /// Blocked on a full buffer
    Waiting = 3,
}

impl ProducerState {
    /// Returns the wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns a lowercase label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Resting => "resting",
            Self::Producing => "producing",
            Self::Exporting => "exporting",
            Self::Waiting => "waiting",
        }
    }
}

impl From<ProducerState> for u8 {
    fn from(state: ProducerState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for ProducerState {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Resting),
            1 => Ok(Self::Producing),
            2 => Ok(Self::Exporting),
            3 => Ok(Self::Waiting),
            other => Err(DomainError::InvalidFieldValue {
                field: "producer status".to_string(),
                value: other.to_string(),
                expected: "0..=3".to_string(),
            }),
        }
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
