//! rdist Protocol - Wire protocol for server communication
//!
//! This crate provides the plaintext vocabulary spoken between the server
//! and its two kinds of clients (consumers and monitors), the resource
//! descriptor format, and the snapshot document pushed to monitors.
//!
//! Every message in both directions is a single `\n`-terminated line.

pub mod frame;
pub mod message;
pub mod parse;
pub mod snapshot;

pub use frame::{encode_line, strip_line_ending, FrameError, MAX_LINE_LEN, MAX_REPLY_LEN};
pub use message::{
    ConsumerCommand, Handshake, MonitorCommand, CONSUME, INVALID_REQUEST, REPORT,
    UNRECOGNIZED_COMMAND,
};
pub use parse::{format_resource, parse_resource, ParseError};
pub use snapshot::{
    ConsumerReport, EventReport, ProducerReport, Report, ResourceReport, SnapshotDocument,
    SnapshotError,
};
