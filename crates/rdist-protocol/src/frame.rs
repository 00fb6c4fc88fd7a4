//! Line framing.
//!
//! Commands are delimited by `\n`. A peer that packs several commands into
//! one TCP segment is read as several commands, and a trailing `\r` from
//! line-mode terminals is ignored.

use thiserror::Error;

/// Longest accepted line, terminator included (64 KiB).
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Longest line a client accepts from the server (16 MiB).
///
/// Snapshots grow with the number of connected consumers, so they are not
/// bound by [`MAX_LINE_LEN`].
pub const MAX_REPLY_LEN: usize = 16 * 1024 * 1024;

/// Framing violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Line too long: {size} bytes (max: {max})")]
    TooLong { size: usize, max: usize },
}

/// Removes the `\n` / `\r\n` terminator from a raw line.
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Encodes a message body as a terminated line.
///
/// # Errors
///
/// `FrameError::TooLong` if the encoded line would exceed [`MAX_LINE_LEN`].
pub fn encode_line(body: &str) -> Result<Vec<u8>, FrameError> {
    let size = body.len() + 1;
    if size > MAX_LINE_LEN {
        return Err(FrameError::TooLong {
            size,
            max: MAX_LINE_LEN,
        });
    }
    let mut line = Vec::with_capacity(size);
    line.extend_from_slice(body.as_bytes());
    line.push(b'\n');
    Ok(line)
}
