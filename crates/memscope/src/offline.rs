//! Offline snapshot backends.
//!
//! A snapshot is a previously captured copy of one region of some process's
//! memory: an 8-byte native-endian start address immediately followed by the
//! raw captured bytes, with no further structure. Reads are addressed by the
//! captured region's original addresses.

use std::path::Path;
use std::sync::Arc;

use crate::error::{MemoryError, MemoryResult};
use crate::file::MemoryFile;
use crate::range::MemoryRange;
use crate::traits::Memory;

/// Size of the start-address header at the front of a snapshot file.
const HEADER_SIZE: u64 = 8;

/// A single snapshot loaded from a file.
pub struct MemoryOffline {
    memory: MemoryRange,
}

impl MemoryOffline {
    /// Load the snapshot at `offset` within `path`.
    pub fn new(path: impl AsRef<Path>, offset: u64) -> MemoryResult<Self> {
        let path = path.as_ref();
        let memory_file = Arc::new(MemoryFile::new(path, offset, None)?);

        let mut header = [0u8; HEADER_SIZE as usize];
        if !memory_file.read_fully(0, &mut header) {
            return Err(MemoryError::truncated_snapshot(path));
        }
        let start = u64::from_ne_bytes(header);

        let length = memory_file
            .size()
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| MemoryError::truncated_snapshot(path))?;

        // The bytes after the header are the captured region, rebased to the
        // start address the header records.
        Ok(MemoryOffline {
            memory: MemoryRange::new(memory_file, HEADER_SIZE, length, start),
        })
    }
}

impl Memory for MemoryOffline {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        self.memory.read(addr, dst)
    }
}

/// A snapshot over caller-supplied bytes covering `[start, end)`.
///
/// Used for snapshots already materialized in this process; no file is
/// involved and the bytes are shared, not copied.
pub struct MemoryOfflineBuffer {
    data: Arc<[u8]>,
    start: u64,
    end: u64,
}

impl MemoryOfflineBuffer {
    pub fn new(data: impl Into<Arc<[u8]>>, start: u64, end: u64) -> Self {
        MemoryOfflineBuffer {
            data: data.into(),
            start,
            end,
        }
    }

    /// Re-point the snapshot at different bytes and region bounds.
    pub fn reset(&mut self, data: impl Into<Arc<[u8]>>, start: u64, end: u64) {
        self.data = data.into();
        self.start = start;
        self.end = end;
    }
}

impl Memory for MemoryOfflineBuffer {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        if addr < self.start || addr >= self.end {
            return 0;
        }

        let rel = (addr - self.start) as usize;
        let available = self.data.len().saturating_sub(rel);
        let len = dst
            .len()
            .min((self.end - addr).min(usize::MAX as u64) as usize)
            .min(available);
        dst[..len].copy_from_slice(&self.data[rel..rel + len]);
        len
    }
}

/// Several disjoint snapshots captured from one process.
///
/// A read is satisfied entirely by the first part that returns bytes, in
/// insertion order; requests are never stitched across parts, so parts are
/// assumed not to overlap and reads not to span two of them.
#[derive(Default)]
pub struct MemoryOfflineParts {
    memories: Vec<MemoryOffline>,
}

impl MemoryOfflineParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a captured piece.
    pub fn add(&mut self, memory: MemoryOffline) {
        self.memories.push(memory);
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

impl Memory for MemoryOfflineParts {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        for memory in &self.memories {
            let bytes = memory.read(addr, dst);
            if bytes != 0 {
                return bytes;
            }
        }
        0
    }
}
