//! Error types for memory-source construction.
//!
//! Only construction (opening, mapping, snapshot header parsing) produces
//! errors. The read path never does: a short or zero byte count from
//! [`Memory::read`](crate::Memory::read) is the failure signal there.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a memory source.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// I/O error while opening or inspecting a backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested offset lies at or beyond the end of the file.
    #[error("offset {offset:#x} is outside file '{path}' of size {file_size}")]
    OffsetOutOfRange {
        path: PathBuf,
        offset: u64,
        file_size: u64,
    },

    /// A snapshot file is too small to carry its 8-byte start-address header.
    #[error("snapshot '{path}' is truncated: no start-address header")]
    TruncatedSnapshot { path: PathBuf },
}

impl MemoryError {
    /// Create an OffsetOutOfRange error.
    pub fn offset_out_of_range(path: impl Into<PathBuf>, offset: u64, file_size: u64) -> Self {
        MemoryError::OffsetOutOfRange {
            path: path.into(),
            offset,
            file_size,
        }
    }

    /// Create a TruncatedSnapshot error.
    pub fn truncated_snapshot(path: impl Into<PathBuf>) -> Self {
        MemoryError::TruncatedSnapshot { path: path.into() }
    }
}

/// Result type for memory-source construction.
pub type MemoryResult<T> = Result<T, MemoryError>;
