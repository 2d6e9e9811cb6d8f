//! Runtime environment queries shared by the backends.

use once_cell::sync::Lazy;

static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf(_SC_PAGESIZE) has no side effects and no pointer arguments.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
});

/// The OS page size, queried once from the runtime environment.
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Size of the machine word transferred by a single ptrace peek.
pub const WORD_SIZE: usize = std::mem::size_of::<libc::c_long>();
