//! Two-tier bitmap cache for loading-tier pages
//!
//! The memory tier is a small LRU sized to the offscreen window; the disk tier
//! is a byte-budgeted LRU that survives restarts. Both are keyed by
//! `md5("{identity}_{page}")`.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use lru::LruCache;

use super::disk_cache::DiskCache;
use super::types::Bitmap;

/// Cache key for a rendered page of a given document
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hex digest of `{identity}_{page}`
    #[must_use]
    pub fn for_page(identity: &str, page: usize) -> Self {
        let digest = md5::compute(format!("{identity}_{page}").as_bytes());
        Self(format!("{digest:x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key from its stored digest
    #[must_use]
    pub(crate) fn from_digest(digest: String) -> Self {
        Self(digest)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capacity of the memory tier for a given offscreen window
#[must_use]
pub fn memory_capacity(offscreen_limit: usize) -> usize {
    offscreen_limit * 2 + 1
}

/// LRU cache for decoded page bitmaps
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<Bitmap>>,
}

impl PageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(Self::non_zero(capacity)),
        }
    }

    fn non_zero(capacity: usize) -> NonZeroUsize {
        NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Get a cached bitmap, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    pub fn insert(&mut self, key: CacheKey, bitmap: Arc<Bitmap>) {
        self.cache.put(key, bitmap);
    }

    /// Change capacity, evicting least recently used entries if shrinking
    pub fn resize(&mut self, capacity: usize) {
        self.cache.resize(Self::non_zero(capacity));
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

/// Memory + persistent cache shared by all worker threads.
///
/// Cloning is cheap and clones share state. Disk failures are logged and
/// behave like misses.
#[derive(Clone)]
pub struct BitmapCache {
    memory: Arc<Mutex<PageCache>>,
    disk: Option<DiskCache>,
}

impl BitmapCache {
    #[must_use]
    pub fn new(memory_capacity: usize, disk: Option<DiskCache>) -> Self {
        Self {
            memory: Arc::new(Mutex::new(PageCache::new(memory_capacity))),
            disk,
        }
    }

    /// Memory-only cache
    #[must_use]
    pub fn in_memory(memory_capacity: usize) -> Self {
        Self::new(memory_capacity, None)
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, PageCache> {
        self.memory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Look up memory first, then disk; disk hits are promoted into memory
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        if let Some(hit) = self.memory().get(key) {
            return Some(hit);
        }

        let disk = self.disk.as_ref()?;
        match disk.get(key) {
            Ok(Some(bitmap)) => {
                debug!("Disk cache hit for {key}");
                let bitmap = Arc::new(bitmap);
                self.memory().insert(key.clone(), Arc::clone(&bitmap));
                Some(bitmap)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Disk cache read failed for {key}: {e}");
                None
            }
        }
    }

    /// Store into both tiers
    pub fn put(&self, key: CacheKey, bitmap: Arc<Bitmap>) {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(&key, &bitmap) {
                warn!("Disk cache write failed for {key}: {e}");
            }
        }
        self.memory().insert(key, bitmap);
    }

    /// Drop everything held in memory; the disk tier is untouched
    pub fn evict_memory(&self) {
        self.memory().invalidate_all();
    }

    pub fn resize_memory(&self, capacity: usize) {
        self.memory().resize(capacity);
    }

    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    #[must_use]
    pub fn memory_capacity(&self) -> usize {
        self.memory().capacity()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::PixelSize;
    use super::*;

    fn bitmap(shade: u8) -> Arc<Bitmap> {
        Arc::new(Bitmap::filled(PixelSize::new(4, 3), [shade, shade, shade, 255]))
    }

    #[test]
    fn key_is_md5_of_identity_and_page() {
        let key = CacheKey::for_page("report.pdf", 3);
        let expected = format!("{:x}", md5::compute(b"report.pdf_3"));
        assert_eq!(key.as_str(), expected);
        assert_eq!(key.as_str().len(), 32);
        assert_ne!(key, CacheKey::for_page("report.pdf", 4));
        assert_ne!(key, CacheKey::for_page("other.pdf", 3));
    }

    #[test]
    fn memory_capacity_follows_offscreen_window() {
        assert_eq!(memory_capacity(1), 3);
        assert_eq!(memory_capacity(2), 5);
    }

    #[test]
    fn cache_lru_eviction() {
        let mut cache = PageCache::new(2);

        for i in 0..3 {
            cache.insert(CacheKey::for_page("doc", i), bitmap(i as u8));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::for_page("doc", 0)));
        assert!(cache.contains(&CacheKey::for_page("doc", 1)));
        assert!(cache.contains(&CacheKey::for_page("doc", 2)));
    }

    #[test]
    fn get_promotes_entry() {
        let mut cache = PageCache::new(2);
        cache.insert(CacheKey::for_page("doc", 0), bitmap(0));
        cache.insert(CacheKey::for_page("doc", 1), bitmap(1));

        let _ = cache.get(&CacheKey::for_page("doc", 0));
        cache.insert(CacheKey::for_page("doc", 2), bitmap(2));

        assert!(cache.contains(&CacheKey::for_page("doc", 0)));
        assert!(!cache.contains(&CacheKey::for_page("doc", 1)));
    }

    #[test]
    fn resize_shrinks_capacity() {
        let mut cache = PageCache::new(5);
        for i in 0..5 {
            cache.insert(CacheKey::for_page("doc", i), bitmap(i as u8));
        }
        cache.resize(3);
        assert_eq!(cache.capacity(), 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&CacheKey::for_page("doc", 4)));
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let cache = PageCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn memory_only_cache_misses_after_eviction() {
        let cache = BitmapCache::in_memory(3);
        let key = CacheKey::for_page("doc", 0);
        cache.put(key.clone(), bitmap(7));
        assert!(cache.get(&key).is_some());

        cache.evict_memory();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn disk_hit_is_promoted_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::open(dir.path(), 10 * 1024 * 1024).unwrap();
        let cache = BitmapCache::new(3, Some(disk));
        let key = CacheKey::for_page("doc", 1);
        let original = bitmap(42);

        cache.put(key.clone(), Arc::clone(&original));
        cache.evict_memory();
        assert_eq!(cache.memory_len(), 0);

        let restored = cache.get(&key).unwrap();
        assert_eq!(*restored, *original);
        assert_eq!(cache.memory_len(), 1);
    }
}
