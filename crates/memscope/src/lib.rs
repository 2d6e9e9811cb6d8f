//! memscope: the memory-access layer under a stack unwinder.
//!
//! Every backend — an in-process buffer, a mapped file window, the local or a
//! remote process's address space, rebased windows and window sets, offline
//! snapshots, and the caching wrappers — implements the one [`Memory`] read
//! contract, so the unwinder never knows what physically backs an address.
//!
//! Failure on the read path is a short or zero byte count, never a panic:
//! addresses come from possibly corrupted stacks, and all bounds and address
//! arithmetic fail closed on overflow.
//!
//! The factories assemble the common chains:
//!
//! ```rust,ignore
//! let proc_mem = memscope::create_process_memory_cached(pid);
//! let mut frame = [0u8; 8];
//! if proc_mem.read_fully(sp, &mut frame) {
//!     // ...
//! }
//! ```

pub mod buffer;
pub mod cache;
pub mod error;
pub mod file;
pub mod local;
pub mod offline;
pub mod range;
pub mod remote;
mod sys;
pub mod traits;

use std::path::Path;
use std::sync::Arc;

use nix::unistd::{self, Pid};

pub use buffer::MemoryBuffer;
pub use cache::{MemoryCache, MemoryThreadCache};
pub use error::{MemoryError, MemoryResult};
pub use file::MemoryFile;
pub use local::MemoryLocal;
pub use offline::{MemoryOffline, MemoryOfflineBuffer, MemoryOfflineParts};
pub use range::{MemoryRange, MemoryRanges};
pub use remote::MemoryRemote;
pub use traits::Memory;

/// Memory over a window of `path` starting at `offset`, optionally truncated
/// to `size` bytes.
pub fn create_file_memory(
    path: impl AsRef<Path>,
    offset: u64,
    size: Option<u64>,
) -> MemoryResult<Arc<dyn Memory>> {
    Ok(Arc::new(MemoryFile::new(path, offset, size)?))
}

/// Memory over a process's address space: the local backend when `pid` is the
/// calling process, the remote backend otherwise.
pub fn create_process_memory(pid: Pid) -> Arc<dyn Memory> {
    if pid == unistd::getpid() {
        Arc::new(MemoryLocal::new())
    } else {
        Arc::new(MemoryRemote::new(pid))
    }
}

/// [`create_process_memory`] wrapped in a shared page cache.
pub fn create_process_memory_cached(pid: Pid) -> Arc<dyn Memory> {
    Arc::new(MemoryCache::new(create_process_memory(pid)))
}

/// [`create_process_memory`] wrapped in a per-thread page cache.
pub fn create_process_memory_thread_cached(pid: Pid) -> Arc<dyn Memory> {
    Arc::new(MemoryThreadCache::new(create_process_memory(pid)))
}

/// Memory over an already-materialized snapshot of `[start, end)`.
pub fn create_offline_memory(data: impl Into<Arc<[u8]>>, start: u64, end: u64) -> Arc<dyn Memory> {
    Arc::new(MemoryOfflineBuffer::new(data, start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_file_memory() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"unwind tables").unwrap();
        file.flush().unwrap();

        let mem = create_file_memory(file.path(), 7, None).unwrap();
        let mut dst = [0u8; 6];
        assert!(mem.read_fully(0, &mut dst));
        assert_eq!(&dst, b"tables");

        assert!(create_file_memory(file.path(), 1000, None).is_err());
    }

    #[test]
    fn test_create_process_memory_selects_local() {
        let mem = create_process_memory(unistd::getpid());

        let src = vec![7u8; 32];
        let mut dst = [0u8; 32];
        assert!(mem.read_fully(src.as_ptr() as u64, &mut dst));
        assert_eq!(&dst[..], &src[..]);
    }

    #[test]
    fn test_create_process_memory_cached_reads_self() {
        // A page-aligned, page-sized allocation so cache fills stay inside
        // owned memory.
        let src = vec![0x42u8; 4096];
        for mem in [
            create_process_memory_cached(unistd::getpid()),
            create_process_memory_thread_cached(unistd::getpid()),
        ] {
            let mut dst = [0u8; 16];
            assert!(mem.read_fully(src.as_ptr() as u64 + 64, &mut dst));
            assert_eq!(dst, [0x42; 16]);
        }
    }

    #[test]
    fn test_create_offline_memory() {
        let data: Vec<u8> = (0..100).collect();
        let mem = create_offline_memory(data.clone(), 0x1000, 0x1064);

        let mut dst = [0u8; 10];
        assert!(mem.read_fully(0x1000 + 50, &mut dst));
        assert_eq!(&dst, &data[50..60]);
        assert_eq!(mem.read(0x2000, &mut dst), 0);
    }
}
