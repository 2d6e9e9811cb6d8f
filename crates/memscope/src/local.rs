//! Local-process backend.

use nix::unistd;

use crate::remote::process_vm_read;
use crate::traits::Memory;

/// Memory source over the calling process's own address space.
///
/// `process_vm_readv` on self is tried first because it turns a faulting page
/// into a short read instead of a crash; when the syscall transfers nothing
/// for a non-zero request (denied by a sandbox, for instance), a direct copy
/// from the raw address takes over. The direct copy requires the address
/// range to actually be mapped, per this layer's operating assumptions.
#[derive(Default)]
pub struct MemoryLocal;

impl MemoryLocal {
    pub fn new() -> Self {
        MemoryLocal
    }
}

impl Memory for MemoryLocal {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        if dst.is_empty() {
            return 0;
        }

        let bytes = process_vm_read(unistd::getpid(), addr, dst);
        if bytes > 0 {
            return bytes;
        }

        // Fail closed on any address arithmetic the pointer cast below could
        // not represent.
        let end = match addr.checked_add(dst.len() as u64) {
            Some(end) => end,
            None => return 0,
        };
        if end > usize::MAX as u64 {
            return 0;
        }

        // SAFETY: the address range was overflow-checked above and the
        // caller guarantees it is mapped in this process (the same contract
        // as handing out a raw slice of it).
        unsafe {
            std::ptr::copy_nonoverlapping(addr as usize as *const u8, dst.as_mut_ptr(), dst.len());
        }
        dst.len()
    }
}
