//! Error types for the storage engine.
//!
//! All storage operations return `Result<T>`, aliased to `Result<T, Error>`,
//! so callers can propagate with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested index entry does not exist yet, or the index has no
    /// room for another entry. Internal to the engine; never user-facing.
    #[error("end of index data")]
    EndOfData,

    /// The requested offset is outside the range currently held by the log,
    /// either because it has not been written yet or because retention
    /// removed the segment that held it.
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),

    /// A stored record failed to decode. Points at on-disk corruption or a
    /// file written by an incompatible version.
    #[error("record decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The log has been closed or removed; no further operations are
    /// permitted.
    #[error("log is closed")]
    Closed,
}
