//! Remote-process backend.
//!
//! Reads another (already stopped and attached) process's address space.
//! The fast path is a single `process_vm_readv` call; when the syscall is
//! unavailable or denied (sandboxing, missing capability) reads degrade to
//! word-at-a-time `ptrace` peeks. Whichever path first yields data is pinned
//! for the lifetime of the object.

use std::sync::atomic::{AtomicU8, Ordering};

use libc::{c_ulong, c_void, iovec};
use nix::sys::ptrace;
use nix::unistd::Pid;
use tracing::debug;

use crate::sys;
use crate::traits::Memory;

/// The syscall refuses more than this many remote iovecs per call.
const MAX_IOVECS: usize = 64;

const STRATEGY_UNRESOLVED: u8 = 0;
const STRATEGY_VM_READ: u8 = 1;
const STRATEGY_PTRACE: u8 = 2;

/// Bulk read from `pid`'s address space via `process_vm_readv`.
///
/// Remote iovecs are split at page boundaries: partial transfers apply at
/// iovec granularity, so an iovec spanning a faulting page would lose the
/// readable part too. At most [`MAX_IOVECS`] descriptors go into one syscall;
/// the loop issues further calls for the remainder.
pub(crate) fn process_vm_read(pid: Pid, remote_src: u64, dst: &mut [u8]) -> usize {
    let page_size = sys::page_size() as u64;
    let mut cur = remote_src;
    let mut len = dst.len();
    let mut total_read = 0usize;

    while len > 0 {
        let dst_iov = iovec {
            // SAFETY: total_read never exceeds dst.len().
            iov_base: unsafe { dst.as_mut_ptr().add(total_read) } as *mut c_void,
            iov_len: len,
        };

        let mut src_iovs = [iovec {
            iov_base: std::ptr::null_mut(),
            iov_len: 0,
        }; MAX_IOVECS];
        let mut iovecs_used = 0;
        while len > 0 && iovecs_used < MAX_IOVECS {
            // iov_base is a pointer, so the address must fit one.
            if cur >= usize::MAX as u64 {
                return total_read;
            }
            let misalignment = cur & (page_size - 1);
            let iov_len = ((page_size - misalignment) as usize).min(len);
            let next = match cur.checked_add(iov_len as u64) {
                Some(next) => next,
                None => return total_read,
            };
            src_iovs[iovecs_used] = iovec {
                iov_base: cur as usize as *mut c_void,
                iov_len,
            };
            cur = next;
            len -= iov_len;
            iovecs_used += 1;
        }

        // SAFETY: dst_iov points into the live dst slice, src_iovs holds
        // iovecs_used initialized descriptors, and the kernel validates the
        // remote addresses itself (invalid ones yield a partial transfer).
        let rc = unsafe {
            libc::process_vm_readv(
                pid.as_raw(),
                &dst_iov,
                1,
                src_iovs.as_ptr(),
                iovecs_used as c_ulong,
                0,
            )
        };
        if rc == -1 {
            return total_read;
        }
        total_read += rc as usize;
    }
    total_read
}

/// One word via `PTRACE_PEEKDATA`.
///
/// nix clears errno before the peek, so a stored value of -1 is
/// distinguishable from a failed call.
fn ptrace_read_word(pid: Pid, addr: u64) -> Option<libc::c_long> {
    ptrace::read(pid, addr as usize as ptrace::AddressType).ok()
}

/// Word-at-a-time fallback read from `pid`'s address space.
///
/// Handles an unaligned start (read the containing word, copy the tail),
/// aligned words in the middle, and a partial trailing word. The target must
/// already be ptrace-attached and stopped.
pub(crate) fn ptrace_read(pid: Pid, mut addr: u64, dst: &mut [u8]) -> usize {
    if addr.checked_add(dst.len() as u64).is_none() {
        return 0;
    }

    let word = sys::WORD_SIZE;
    let word_mask = word as u64 - 1;
    let mut bytes_read = 0usize;

    let align_bytes = (addr & word_mask) as usize;
    if align_bytes != 0 {
        let data = match ptrace_read_word(pid, addr & !word_mask) {
            Some(data) => data.to_ne_bytes(),
            None => return 0,
        };
        let copy_bytes = (word - align_bytes).min(dst.len());
        dst[..copy_bytes].copy_from_slice(&data[align_bytes..align_bytes + copy_bytes]);
        addr += copy_bytes as u64;
        bytes_read += copy_bytes;
    }

    let whole_words = (dst.len() - bytes_read) / word;
    for _ in 0..whole_words {
        let data = match ptrace_read_word(pid, addr) {
            Some(data) => data.to_ne_bytes(),
            None => return bytes_read,
        };
        dst[bytes_read..bytes_read + word].copy_from_slice(&data);
        addr += word as u64;
        bytes_read += word;
    }

    let left_over = dst.len() - bytes_read;
    if left_over > 0 {
        let data = match ptrace_read_word(pid, addr) {
            Some(data) => data.to_ne_bytes(),
            None => return bytes_read,
        };
        dst[bytes_read..].copy_from_slice(&data[..left_over]);
        bytes_read += left_over;
    }
    bytes_read
}

/// Memory source over another process's address space.
///
/// The first read probes `process_vm_readv` and falls back to ptrace peeks if
/// the bulk path yields nothing; whichever path first returns data is
/// recorded and reused for every later read on this object. The record is a
/// relaxed atomic hint: two threads racing the first read may both probe, but
/// both paths are independently correct, so the race costs at most one
/// redundant probe.
pub struct MemoryRemote {
    pid: Pid,
    strategy: AtomicU8,
}

impl MemoryRemote {
    /// Create a reader for `pid`. The target must already be stopped and
    /// attached by the caller's environment.
    pub fn new(pid: Pid) -> Self {
        MemoryRemote {
            pid,
            strategy: AtomicU8::new(STRATEGY_UNRESOLVED),
        }
    }

    /// The target process.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    fn read_with<B, F>(&self, addr: u64, dst: &mut [u8], bulk: B, fallback: F) -> usize
    where
        B: Fn(Pid, u64, &mut [u8]) -> usize,
        F: Fn(Pid, u64, &mut [u8]) -> usize,
    {
        match self.strategy.load(Ordering::Relaxed) {
            STRATEGY_VM_READ => bulk(self.pid, addr, dst),
            STRATEGY_PTRACE => fallback(self.pid, addr, dst),
            _ => {
                // Prefer the bulk syscall; assume that if it works once it
                // keeps working for this target.
                let bytes = bulk(self.pid, addr, dst);
                if bytes > 0 {
                    self.strategy.store(STRATEGY_VM_READ, Ordering::Relaxed);
                    debug!(pid = self.pid.as_raw(), "pinned process_vm_readv path");
                    return bytes;
                }
                let bytes = fallback(self.pid, addr, dst);
                if bytes > 0 {
                    self.strategy.store(STRATEGY_PTRACE, Ordering::Relaxed);
                    debug!(pid = self.pid.as_raw(), "pinned ptrace fallback path");
                }
                bytes
            }
        }
    }
}

impl Memory for MemoryRemote {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        // Cannot form a pointer to an address above 32 bits in a 32-bit context.
        #[cfg(target_pointer_width = "32")]
        if addr > u32::MAX as u64 {
            return 0;
        }

        self.read_with(addr, dst, process_vm_read, ptrace_read)
    }
}
