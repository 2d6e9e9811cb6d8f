//! Rebased sub-windows over other memory sources.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::traits::Memory;

/// A `[offset, offset + length)` window onto another memory source.
///
/// External addresses inside the window are rebased into the underlying
/// source's coordinates via `addr - offset + begin`. The underlying source is
/// shared, so several ranges can view one mapping.
pub struct MemoryRange {
    memory: Arc<dyn Memory>,
    begin: u64,
    length: u64,
    offset: u64,
}

impl MemoryRange {
    pub fn new(memory: Arc<dyn Memory>, begin: u64, length: u64, offset: u64) -> Self {
        MemoryRange {
            memory,
            begin,
            length,
            offset,
        }
    }

    /// First external address covered by this window.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes the window covers.
    pub fn length(&self) -> u64 {
        self.length
    }
}

impl Memory for MemoryRange {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        if addr < self.offset {
            return 0;
        }
        let read_offset = addr - self.offset;
        if read_offset >= self.length {
            return 0;
        }

        let read_length = (dst.len() as u64).min(self.length - read_offset) as usize;
        let read_addr = match read_offset.checked_add(self.begin) {
            Some(read_addr) => read_addr,
            None => return 0,
        };

        self.memory.read(read_addr, &mut dst[..read_length])
    }
}

/// An ordered set of [`MemoryRange`]s dispatching reads by address.
///
/// Each range is keyed by its upper bound; a read goes to the first range
/// whose upper bound exceeds the queried address, which also defines the
/// tie-break when ranges are adjacent. Overlapping ranges are not detected
/// and their behavior is limited to that tie-break.
#[derive(Default)]
pub struct MemoryRanges {
    maps: BTreeMap<u64, MemoryRange>,
}

impl MemoryRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a range, keyed by `offset + length` clamped to `u64::MAX`.
    ///
    /// The sum can only overflow for a crafted segment offset; clamping keeps
    /// the entry addressable instead of wrapping it to a small key.
    pub fn insert(&mut self, memory: MemoryRange) {
        let last_addr = memory.offset().saturating_add(memory.length());
        self.maps.insert(last_addr, memory);
    }
}

impl Memory for MemoryRanges {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        let entry = self
            .maps
            .range((Bound::Excluded(addr), Bound::Unbounded))
            .next();
        match entry {
            Some((_, range)) => range.read(addr, dst),
            None => 0,
        }
    }
}
