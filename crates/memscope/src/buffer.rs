//! In-process byte-buffer backend.

use crate::traits::Memory;

/// Memory source over a plain in-process byte buffer.
///
/// Addresses are offsets into the buffer; the first byte lives at address 0.
/// Callers typically size the buffer up front and fill it through
/// [`as_mut_slice`](MemoryBuffer::as_mut_slice).
#[derive(Default)]
pub struct MemoryBuffer {
    raw: Vec<u8>,
}

impl MemoryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero-filled buffer of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        MemoryBuffer {
            raw: vec![0; size],
        }
    }

    /// Take ownership of existing bytes.
    pub fn from_vec(raw: Vec<u8>) -> Self {
        MemoryBuffer { raw }
    }

    /// Resize the buffer, zero-filling any growth.
    pub fn resize(&mut self, size: usize) {
        self.raw.resize(size, 0);
    }

    /// Number of bytes in the buffer.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// The buffer contents starting at `offset`, or `None` if out of bounds.
    pub fn as_slice(&self, offset: usize) -> Option<&[u8]> {
        self.raw.get(offset..)
    }

    /// Mutable access to the whole buffer, for callers that fill it.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw
    }
}

impl Memory for MemoryBuffer {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        if addr >= self.raw.len() as u64 {
            return 0;
        }
        let start = addr as usize;
        let len = dst.len().min(self.raw.len() - start);
        dst[..len].copy_from_slice(&self.raw[start..start + len]);
        len
    }
}
