//! Mapped-file backend.
//!
//! Maps a page-aligned window of a file and exposes a logical sub-window
//! starting at an arbitrary, possibly unaligned byte offset. Used both for
//! reading ELF objects at their load offset and as the base of offline
//! snapshots.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{MemoryError, MemoryResult};
use crate::sys;
use crate::traits::Memory;

/// Read-only view of a file starting at a byte offset.
///
/// The mapping itself always starts on a page boundary at or before the
/// requested offset; reads are rebased so that address 0 corresponds to the
/// requested offset. Dropping the value unmaps the full aligned mapping.
pub struct MemoryFile {
    map: Mmap,
    /// Distance from the aligned mapping start to the requested offset.
    start: usize,
    /// Length of the exposed window.
    size: usize,
}

impl MemoryFile {
    /// Map `path` starting at `offset`.
    ///
    /// `size` optionally truncates the exposed window; when it is larger than
    /// what remains in the file (or `None`), the window runs to end of file.
    pub fn new(path: impl AsRef<Path>, offset: u64, size: Option<u64>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Err(MemoryError::offset_out_of_range(path, offset, file_size));
        }

        let page_mask = sys::page_size() as u64 - 1;
        let misalignment = offset & page_mask;
        let aligned_offset = offset & !page_mask;

        let mut map_len = file_size - aligned_offset;
        if let Some(limit) = size {
            // Overflow here means the caller asked for more than the address
            // space can hold; keep the end-of-file length instead.
            if let Some(wanted) = limit.checked_add(misalignment) {
                if wanted < map_len {
                    map_len = wanted;
                }
            }
        }
        let map_len = usize::try_from(map_len)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

        // SAFETY: the file is opened read-only and mapped privately; the map
        // is dropped before the File handle would be needed for anything else.
        let map = unsafe {
            MmapOptions::new()
                .offset(aligned_offset)
                .len(map_len)
                .map(&file)?
        };

        debug!(
            path = %path.display(),
            offset,
            aligned_offset,
            window = map_len - misalignment as usize,
            "mapped file window"
        );

        Ok(MemoryFile {
            map,
            start: misalignment as usize,
            size: map_len - misalignment as usize,
        })
    }

    /// Length of the exposed window in bytes.
    pub fn size(&self) -> u64 {
        self.size as u64
    }

    fn window(&self) -> &[u8] {
        &self.map[self.start..self.start + self.size]
    }
}

impl Memory for MemoryFile {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        let window = self.window();
        if addr >= window.len() as u64 {
            return 0;
        }
        let start = addr as usize;
        let len = dst.len().min(window.len() - start);
        dst[..len].copy_from_slice(&window[start..start + len]);
        len
    }
}
