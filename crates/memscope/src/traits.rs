//! The read contract shared by every memory backend.
//!
//! The [`Memory`] trait lets the unwinder work with any byte source — a live
//! process, a mapped file, an offline snapshot — behind one interface.
//! Failure is always a short or zero byte count, never a panic or an error
//! value: addresses routinely come from corrupted stacks and a bad address is
//! normal input, not an exceptional condition.

/// Scratch size for the string-terminator scan. Large enough for the vast
/// majority of symbol names, so most strings need a single read.
const STRING_CHUNK: usize = 256;

/// Trait for reading from a memory source.
///
/// Implementations copy `0 ..= dst.len()` bytes starting at `addr` into `dst`
/// and report how many were copied. A return of `0` means `addr` is outside
/// the source's valid domain or the transfer mechanism failed entirely; a
/// return below `dst.len()` means only a prefix was transferable.
pub trait Memory: Send + Sync {
    /// Read up to `dst.len()` bytes starting at `addr` into `dst`.
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize;

    /// Read exactly `dst.len()` bytes, or report failure.
    ///
    /// On `false`, the contents of `dst` are unspecified.
    fn read_fully(&self, addr: u64, dst: &mut [u8]) -> bool {
        self.read(addr, dst) == dst.len()
    }

    /// Read a zero-terminated string of at most `max_read` bytes at `addr`.
    ///
    /// Scans in fixed-size chunks until the terminator is found, then re-reads
    /// the whole string in one exact-size pass so the allocation matches the
    /// string length. Returns `None` if no terminator lies within `max_read`
    /// bytes, if a chunk cannot be read at all, or if a chunk comes back short
    /// before the terminator is seen.
    fn read_string(&self, addr: u64, max_read: usize) -> Option<String> {
        let mut buffer = [0u8; STRING_CHUNK];
        let mut offset = 0usize;
        while offset < max_read {
            let want = STRING_CHUNK.min(max_read - offset);
            let chunk_addr = addr.checked_add(offset as u64)?;
            let got = self.read(chunk_addr, &mut buffer[..want]);
            if got == 0 {
                return None;
            }
            if let Some(len) = memchr::memchr(0, &buffer[..got]) {
                if offset == 0 {
                    // Single read, the chunk already holds the whole string.
                    return Some(String::from_utf8_lossy(&buffer[..len]).into_owned());
                }
                // The chunk holds only the last block. Now that the length is
                // known, read the whole string again in one pass.
                let mut full = vec![0u8; offset + len];
                if !self.read_fully(addr, &mut full) {
                    return None;
                }
                return Some(String::from_utf8_lossy(&full).into_owned());
            }
            if got < want {
                return None;
            }
            offset += got;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-memory source rebased at a fixed start address.
    struct SliceMemory {
        start: u64,
        data: Vec<u8>,
    }

    impl Memory for SliceMemory {
        fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
            if addr < self.start {
                return 0;
            }
            let off = (addr - self.start) as usize;
            if off >= self.data.len() {
                return 0;
            }
            let len = dst.len().min(self.data.len() - off);
            dst[..len].copy_from_slice(&self.data[off..off + len]);
            len
        }
    }

    #[test]
    fn test_read_fully_exact() {
        let mem = SliceMemory {
            start: 0x1000,
            data: b"0123456789".to_vec(),
        };
        let mut dst = [0u8; 10];
        assert!(mem.read_fully(0x1000, &mut dst));
        assert_eq!(&dst, b"0123456789");

        let mut short = [0u8; 11];
        assert!(!mem.read_fully(0x1000, &mut short));
        assert!(!mem.read_fully(0x2000, &mut dst));
    }

    #[test]
    fn test_read_string_single_chunk() {
        let mem = SliceMemory {
            start: 0,
            data: b"_ZN3foo3barEv\0trailing".to_vec(),
        };
        assert_eq!(mem.read_string(0, 64).as_deref(), Some("_ZN3foo3barEv"));
    }

    #[test]
    fn test_read_string_multi_chunk() {
        // Terminator past the 256-byte scratch buffer, forcing the two-pass path.
        let mut data = vec![b'a'; 300];
        data.push(0);
        let mem = SliceMemory { start: 0, data };
        let s = mem.read_string(0, 512).unwrap();
        assert_eq!(s.len(), 300);
        assert!(s.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_read_string_no_terminator() {
        let mem = SliceMemory {
            start: 0,
            data: vec![b'x'; 64],
        };
        assert_eq!(mem.read_string(0, 32), None);
    }

    #[test]
    fn test_read_string_unreadable() {
        let mem = SliceMemory {
            start: 0x1000,
            data: vec![b'x'; 16],
        };
        assert_eq!(mem.read_string(0, 32), None);
    }

    #[test]
    fn test_read_string_short_chunk_without_terminator_fails() {
        /// Source that transfers at most 5 bytes per call and holds no NUL.
        struct TrickleMemory;

        impl Memory for TrickleMemory {
            fn read(&self, _addr: u64, dst: &mut [u8]) -> usize {
                let len = dst.len().min(5);
                dst[..len].fill(b'k');
                len
            }
        }

        // The chunk comes back short of the request with no terminator in
        // it, so the scan gives up rather than resuming mid-string.
        assert_eq!(TrickleMemory.read_string(0, 64), None);
    }

    #[test]
    fn test_read_string_max_read_bounds_terminator_search() {
        let mut data = vec![b'n'; 20];
        data.push(0);
        let mem = SliceMemory { start: 0, data };
        assert_eq!(mem.read_string(0, 10), None);
        assert!(mem.read_string(0, 21).is_some());
    }
}
