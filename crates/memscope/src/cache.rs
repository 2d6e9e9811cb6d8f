//! Page-granular caching wrappers.
//!
//! Unwinding issues many small reads that cluster on the same few pages
//! (return addresses, unwind tables). Wrapping a source in a cache turns
//! those into one full-page fetch plus local copies. Two variants share the
//! fill logic: [`MemoryCache`] guards one map with a lock, and
//! [`MemoryThreadCache`] gives every calling thread its own map.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::traits::Memory;

const CACHE_BITS: u32 = 12;
const CACHE_SIZE: usize = 1 << CACHE_BITS;
const CACHE_MASK: u64 = (CACHE_SIZE as u64) - 1;

type Page = Box<[u8; CACHE_SIZE]>;
type PageMap = HashMap<u64, Page>;

fn new_page() -> Page {
    Box::new([0u8; CACHE_SIZE])
}

/// Fill logic shared by both cache variants.
struct CacheBase {
    source: Arc<dyn Memory>,
}

impl CacheBase {
    /// Ensure `page` is cached, filling it from the source if needed.
    ///
    /// The slot is inserted before the fill; a failed fill removes it again,
    /// so a partial page is never visible to later lookups.
    fn fetch_page<'a>(&self, cache: &'a mut PageMap, page: u64, base: u64) -> Option<&'a Page> {
        if !cache.contains_key(&page) {
            let slot = cache.entry(page).or_insert_with(new_page);
            if !self.source.read_fully(base, slot.as_mut_slice()) {
                cache.remove(&page);
                debug!(page, "page fill failed, falling back to uncached read");
                return None;
            }
        }
        cache.get(&page)
    }

    /// Serve a read from the cache, spanning at most two pages.
    ///
    /// Reads are small relative to the page size, so a request touches the
    /// covering page and at most the next one; each page independently falls
    /// back to an uncached read when its fill fails.
    fn cached_read(&self, cache: &mut PageMap, addr: u64, dst: &mut [u8]) -> usize {
        if dst.is_empty() {
            return 0;
        }

        let page = addr >> CACHE_BITS;
        let in_page = (addr & CACHE_MASK) as usize;
        let max_read = CACHE_SIZE - in_page;

        let head_len = dst.len().min(max_read);
        match self.fetch_page(cache, page, page << CACHE_BITS) {
            Some(cached) => {
                dst[..head_len].copy_from_slice(&cached[in_page..in_page + head_len]);
            }
            None => return self.source.read(addr, dst),
        }
        if dst.len() <= max_read {
            return dst.len();
        }

        // The read crosses into the next page.
        let tail = &mut dst[max_read..];
        let next_base = match (page + 1).checked_mul(CACHE_SIZE as u64) {
            Some(next_base) => next_base,
            None => return max_read,
        };
        // Requests larger than two pages are outside this design; the copy is
        // clamped to the second page, yielding a short read.
        let tail_len = tail.len().min(CACHE_SIZE);
        match self.fetch_page(cache, page + 1, next_base) {
            Some(cached) => {
                tail[..tail_len].copy_from_slice(&cached[..tail_len]);
                max_read + tail_len
            }
            None => max_read + self.source.read(next_base, &mut tail[..tail_len]),
        }
    }
}

/// Cache wrapper sharing one page map across all callers.
///
/// A single lock guards the map; this is deliberately simple and not tuned
/// for many threads hammering one cache instance.
pub struct MemoryCache {
    base: CacheBase,
    cache: Mutex<PageMap>,
}

impl MemoryCache {
    pub fn new(source: Arc<dyn Memory>) -> Self {
        MemoryCache {
            base: CacheBase { source },
            cache: Mutex::new(PageMap::new()),
        }
    }

    /// Drop every cached page.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Memory for MemoryCache {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        let mut cache = self.cache.lock();
        self.base.cached_read(&mut cache, addr, dst)
    }
}

/// Cache wrapper with a private page map per calling thread.
///
/// Threads never contend on page data: the outer lock is only taken long
/// enough to look up (or create) the calling thread's map, and the per-thread
/// mutex is uncontended by construction. The cost is duplicated caching of
/// hot pages across threads. All threads' maps are owned by this object and
/// released together when it drops.
pub struct MemoryThreadCache {
    base: CacheBase,
    caches: RwLock<HashMap<ThreadId, Arc<Mutex<PageMap>>>>,
}

impl MemoryThreadCache {
    pub fn new(source: Arc<dyn Memory>) -> Self {
        MemoryThreadCache {
            base: CacheBase { source },
            caches: RwLock::new(HashMap::new()),
        }
    }

    fn thread_cache(&self) -> Arc<Mutex<PageMap>> {
        let id = thread::current().id();
        if let Some(cache) = self.caches.read().get(&id) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(PageMap::new()))),
        )
    }

    /// Drop the calling thread's cached pages. Other threads' maps are
    /// untouched.
    pub fn clear(&self) {
        let id = thread::current().id();
        self.caches.write().remove(&id);
    }
}

impl Memory for MemoryThreadCache {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        let cache = self.thread_cache();
        let mut cache = cache.lock();
        self.base.cached_read(&mut cache, addr, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that counts full-page fills and can fail one page's fill.
    struct CountingBackend {
        data: Vec<u8>,
        fills: AtomicUsize,
        fail_base: Mutex<Option<u64>>,
    }

    impl CountingBackend {
        fn new(len: usize) -> Self {
            CountingBackend {
                data: (0..len).map(|i| (i % 251) as u8).collect(),
                fills: AtomicUsize::new(0),
                fail_base: Mutex::new(None),
            }
        }

        fn fills(&self) -> usize {
            self.fills.load(Ordering::Relaxed)
        }
    }

    impl Memory for CountingBackend {
        fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
            if dst.len() == CACHE_SIZE {
                self.fills.fetch_add(1, Ordering::Relaxed);
                if *self.fail_base.lock() == Some(addr) {
                    return 0;
                }
            }
            if addr >= self.data.len() as u64 {
                return 0;
            }
            let start = addr as usize;
            let len = dst.len().min(self.data.len() - start);
            dst[..len].copy_from_slice(&self.data[start..start + len]);
            len
        }
    }

    #[test]
    fn test_single_fill_per_page() {
        let backend = Arc::new(CountingBackend::new(3 * CACHE_SIZE));
        let cache = MemoryCache::new(backend.clone());

        let mut dst = [0u8; 4];
        assert!(cache.read_fully(0, &mut dst));
        assert_eq!(backend.fills(), 1);
        assert_eq!(&dst, &backend.data[..4]);

        // Repeated small reads on the same page hit the cache.
        for addr in [8u64, 100, 4000] {
            assert!(cache.read_fully(addr, &mut dst));
        }
        assert_eq!(backend.fills(), 1);
    }

    #[test]
    fn test_read_spanning_two_pages() {
        let backend = Arc::new(CountingBackend::new(3 * CACHE_SIZE));
        let cache = MemoryCache::new(backend.clone());

        let mut dst = [0u8; 4];
        assert!(cache.read_fully(0, &mut dst));
        assert_eq!(backend.fills(), 1);

        let mut span = [0u8; 20];
        assert!(cache.read_fully(4090, &mut span));
        assert_eq!(backend.fills(), 2);
        assert_eq!(&span, &backend.data[4090..4110]);
    }

    #[test]
    fn test_failed_fill_falls_back_and_is_not_cached() {
        let backend = Arc::new(CountingBackend::new(3 * CACHE_SIZE));
        let cache = MemoryCache::new(backend.clone());
        *backend.fail_base.lock() = Some(CACHE_SIZE as u64);

        // The second page's fill fails; the bytes still come back correct
        // through the uncached fallback.
        let mut span = [0u8; 20];
        assert!(cache.read_fully(4090, &mut span));
        assert_eq!(&span, &backend.data[4090..4110]);
        let fills_after_span = backend.fills();

        // The failed page was evicted: once fills succeed again, reading it
        // triggers a fresh fill rather than serving a stale entry.
        *backend.fail_base.lock() = None;
        let mut dst = [0u8; 4];
        assert!(cache.read_fully(CACHE_SIZE as u64, &mut dst));
        assert_eq!(backend.fills(), fills_after_span + 1);
        assert_eq!(&dst, &backend.data[CACHE_SIZE..CACHE_SIZE + 4]);
    }

    #[test]
    fn test_fully_unreadable_source() {
        let backend = Arc::new(CountingBackend::new(CACHE_SIZE));
        let cache = MemoryCache::new(backend.clone());

        let mut dst = [0u8; 8];
        assert_eq!(cache.read(0x10_0000, &mut dst), 0);
        assert_eq!(cache.read(u64::MAX - 2, &mut dst), 0);
    }

    #[test]
    fn test_clear_refills() {
        let backend = Arc::new(CountingBackend::new(CACHE_SIZE));
        let cache = MemoryCache::new(backend.clone());

        let mut dst = [0u8; 4];
        assert!(cache.read_fully(16, &mut dst));
        cache.clear();
        assert!(cache.read_fully(16, &mut dst));
        assert_eq!(backend.fills(), 2);
    }

    #[test]
    fn test_thread_cache_partitions_by_thread() {
        let backend = Arc::new(CountingBackend::new(CACHE_SIZE));
        let cache = Arc::new(MemoryThreadCache::new(
            backend.clone() as Arc<dyn Memory>
        ));

        let mut dst = [0u8; 4];
        assert!(cache.read_fully(0, &mut dst));
        assert_eq!(backend.fills(), 1);

        // A second thread gets its own map and refills the same page.
        let cache2 = Arc::clone(&cache);
        std::thread::spawn(move || {
            let mut dst = [0u8; 4];
            assert!(cache2.read_fully(0, &mut dst));
        })
        .join()
        .unwrap();
        assert_eq!(backend.fills(), 2);

        // This thread's map is still warm.
        assert!(cache.read_fully(8, &mut dst));
        assert_eq!(backend.fills(), 2);
    }

    #[test]
    fn test_thread_cache_clear_only_affects_caller() {
        let backend = Arc::new(CountingBackend::new(CACHE_SIZE));
        let cache = Arc::new(MemoryThreadCache::new(
            backend.clone() as Arc<dyn Memory>
        ));

        let mut dst = [0u8; 4];
        assert!(cache.read_fully(0, &mut dst));
        cache.clear();
        assert!(cache.read_fully(0, &mut dst));
        assert_eq!(backend.fills(), 2);
    }
}
