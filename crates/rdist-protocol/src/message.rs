//! Handshake tokens, client commands and fixed server replies.

use std::fmt;

/// Reply to an unknown handshake token; the connection is closed after it.
pub const INVALID_REQUEST: &str = "invalid request";

/// Reply to an unknown command on an established connection.
pub const UNRECOGNIZED_COMMAND: &str = "unrecognized client command.";

/// Consumer request for one resource.
pub const CONSUME: &str = "consume";

/// Monitor request for the next snapshot.
pub const REPORT: &str = "report";

/// First message on every connection, classifying the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Consumer,
    Monitor,
}

impl Handshake {
    /// Parses a handshake line (terminator already stripped).
    ///
    /// Returns `None` for anything other than the two exact tokens.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "handshake:consumer" => Some(Self::Consumer),
            "handshake:monitor" => Some(Self::Monitor),
            _ => None,
        }
    }

    /// Returns the wire token. The server echoes it back as acknowledgement.
    pub fn token(self) -> &'static str {
        match self {
            Self::Consumer => "handshake:consumer",
            Self::Monitor => "handshake:monitor",
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumer => f.write_str("consumer"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

/// Command read from a consumer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerCommand {
    /// Block until a resource is available and hand it over
    Consume,

    /// Anything else; answered with [`UNRECOGNIZED_COMMAND`]
    Unrecognized(String),
}

impl ConsumerCommand {
    pub fn parse(line: &str) -> Self {
        match line {
            CONSUME => Self::Consume,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Command read from a monitor connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Mark the monitor ready for the next pushed snapshot
    Report,

    /// Anything else; answered with [`UNRECOGNIZED_COMMAND`]
    Unrecognized(String),
}

impl MonitorCommand {
    pub fn parse(line: &str) -> Self {
        match line {
            REPORT => Self::Report,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}
