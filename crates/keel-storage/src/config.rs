//! Storage configuration.
//!
//! Controls how large a segment may grow before the log rotates to a new
//! one. Both limits are per segment; a segment is full as soon as either is
//! reached.

use serde::{Deserialize, Serialize};

/// Fallback applied by [`Log::open`](crate::Log::open) when a limit is left
/// at zero.
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum store file size in bytes before the segment is considered
    /// full. Zero means "use the default". The active segment may overshoot
    /// by up to one record: rotation is checked after each append.
    #[serde(default)]
    pub max_store_bytes: u64,

    /// Maximum index file size in bytes before the segment is considered
    /// full. Also the mapped capacity preallocated for every index file.
    /// Zero means "use the default".
    #[serde(default)]
    pub max_index_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
        }
    }
}
