//! Crate-wide error taxonomy.
//!
//! Three failure classes are distinguished, and all of them are fatal to the
//! operation that raised them:
//!
//! - [`Error::Truncated`] — the input ended before a required field, chunk or
//!   payload was fully available.
//! - [`Error::CorruptData`] — a decoded field violates a structural invariant
//!   (zero match distance, distance beyond the produced output, invalid
//!   opcode or magic, frequency-table overflow, …).
//! - [`Error::InvalidParam`] — the caller supplied inconsistent parameters
//!   (overlapping overlay registration, seek-from-end on a stream without a
//!   known size, …).
//!
//! No decoder or stream retries internally and none returns a partial result
//! on error. Formats with a well-formed end-of-stream marker stop early on
//! it, which is a success path, not an error path.

use std::io;

/// Errors returned by the codec and stream layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input ended before a required field or payload was fully available.
    #[error("unexpected end of input")]
    Truncated,

    /// A decoded field violates a structural invariant of the format.
    #[error("corrupt data: {0}")]
    CorruptData(&'static str),

    /// Caller-supplied parameters are inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// The backing byte source failed.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Short reads against a backing source are truncation, not I/O failure.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(e)
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Truncated => io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of input"),
            Error::CorruptData(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            Error::InvalidParam(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            Error::Io(inner) => inner,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
