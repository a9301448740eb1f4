//! Shared Object Cache
//!
//! Process-wide handle to the cache store. Every operation runs under one
//! mutex; the lock is never held across I/O or an `.await`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheStats, CacheStore, EntryId};
use crate::config::Config;
use crate::error::Result;

// == Object Cache ==
/// Thread-safe object cache shared by every connection handler.
///
/// Cloning is cheap and yields another handle to the same cache.
#[derive(Clone)]
pub struct ObjectCache {
    inner: Arc<Mutex<CacheStore>>,
}

impl ObjectCache {
    // == Constructor ==
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `capacity` - Total bytes of committed bodies the cache may hold
    /// * `max_object_size` - Largest single body that may be committed
    pub fn new(capacity: usize, max_object_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheStore::new(capacity, max_object_size))),
        }
    }

    /// Creates a cache sized from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_cache_size, config.max_object_size)
    }

    // == Lookup ==
    /// Looks up a committed entry and pins it.
    ///
    /// The entry cannot be evicted until the returned pin is released or
    /// dropped.
    pub fn lookup(&self, key: &str) -> Option<PinnedEntry> {
        let (id, body) = self.inner.lock().lookup(key)?;
        Some(PinnedEntry {
            cache: self.clone(),
            id,
            body,
        })
    }

    // == Begin Insert ==
    /// Reserves `key` for a response that is about to be committed.
    ///
    /// Fails with `AlreadyPresent` if another handler holds or has filled the
    /// key.
    pub fn begin_insert(&self, key: &str) -> Result<Placeholder> {
        let id = self.inner.lock().begin_insert(key)?;
        Ok(Placeholder {
            cache: self.clone(),
            id,
            key: key.to_string(),
            settled: false,
        })
    }

    // == Release ==
    /// Releases a pin obtained from `lookup` or `Placeholder::commit`.
    ///
    /// Equivalent to dropping the pin.
    pub fn release(&self, pin: PinnedEntry) {
        drop(pin);
    }

    // == Abort Insert ==
    /// Discards a placeholder without committing it.
    pub fn abort_insert(&self, placeholder: Placeholder) {
        placeholder.abort();
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    // == Inspection ==
    /// Returns true if `key` has a committed entry. Does not pin or promote.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    /// Current pin count for `key`, if it has an entry.
    pub fn pin_count(&self, key: &str) -> Option<usize> {
        self.inner.lock().pin_count(key)
    }

    /// Keys of committed entries from least to most recently used.
    pub fn keys_lru_order(&self) -> Vec<String> {
        self.inner.lock().keys_lru_order()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Bytes held by committed entries.
    pub fn occupied(&self) -> usize {
        self.inner.lock().occupied()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Largest single body the cache admits.
    pub fn max_object_size(&self) -> usize {
        self.inner.lock().max_object_size()
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.inner.lock();
        f.debug_struct("ObjectCache")
            .field("entries", &store.len())
            .field("occupied", &store.occupied())
            .field("capacity", &store.capacity())
            .finish()
    }
}

// == Pinned Entry ==
/// Read access to a committed entry. Holds one pin until dropped.
pub struct PinnedEntry {
    cache: ObjectCache,
    id: EntryId,
    body: Arc<[u8]>,
}

impl PinnedEntry {
    /// The cached response bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Releases the pin now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PinnedEntry {
    fn drop(&mut self) {
        self.cache.inner.lock().release(self.id);
    }
}

impl fmt::Debug for PinnedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedEntry")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}

// == Placeholder ==
/// Reservation of a key by an in-progress fetch.
///
/// Must end in `commit` or `abort`; dropping it aborts.
pub struct Placeholder {
    cache: ObjectCache,
    id: EntryId,
    key: String,
    /// Set once the store no longer needs cleanup from this handle
    settled: bool,
}

impl Placeholder {
    pub fn key(&self) -> &str {
        &self.key
    }

    // == Commit ==
    /// Admits `body` into the cache, evicting LRU entries if needed.
    ///
    /// On success the placeholder's own pin is handed back as a
    /// `PinnedEntry`; dropping it makes the new entry evictable. On failure
    /// the placeholder has already been removed.
    pub fn commit(mut self, body: Vec<u8>) -> Result<PinnedEntry> {
        let result = self.cache.inner.lock().commit(self.id, body);
        self.settled = true;

        result.map(|body| PinnedEntry {
            cache: self.cache.clone(),
            id: self.id,
            body,
        })
    }

    // == Abort ==
    /// Removes the placeholder from the cache.
    pub fn abort(mut self) {
        self.cache.inner.lock().abort_insert(self.id);
        self.settled = true;
    }
}

impl Drop for Placeholder {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.inner.lock().abort_insert(self.id);
        }
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placeholder")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdmissionFailure, CacheError};
    use std::sync::Barrier;
    use std::thread;

    fn insert(cache: &ObjectCache, key: &str, body: &[u8]) {
        cache
            .begin_insert(key)
            .unwrap()
            .commit(body.to_vec())
            .unwrap()
            .release();
    }

    #[test]
    fn test_pin_released_on_drop() {
        let cache = ObjectCache::new(100, 100);
        insert(&cache, "/a", b"abc");
        assert_eq!(cache.pin_count("/a"), Some(0));

        {
            let pin = cache.lookup("/a").unwrap();
            assert_eq!(pin.body(), b"abc");
            assert_eq!(cache.pin_count("/a"), Some(1));
        }

        assert_eq!(cache.pin_count("/a"), Some(0));
    }

    #[test]
    fn test_explicit_release_balances_pins() {
        let cache = ObjectCache::new(100, 100);
        insert(&cache, "/a", b"abc");

        let first = cache.lookup("/a").unwrap();
        let second = cache.lookup("/a").unwrap();
        assert_eq!(cache.pin_count("/a"), Some(2));

        cache.release(first);
        assert_eq!(cache.pin_count("/a"), Some(1));
        second.release();
        assert_eq!(cache.pin_count("/a"), Some(0));
    }

    #[test]
    fn test_dropped_placeholder_is_aborted() {
        let cache = ObjectCache::new(100, 100);

        {
            let placeholder = cache.begin_insert("/a").unwrap();
            assert_eq!(placeholder.key(), "/a");
            assert!(matches!(
                cache.begin_insert("/a"),
                Err(CacheError::AlreadyPresent(_))
            ));
        }

        assert_eq!(cache.pin_count("/a"), None);
        assert!(cache.begin_insert("/a").is_ok());
    }

    #[test]
    fn test_explicit_abort_insert() {
        let cache = ObjectCache::new(100, 100);

        let placeholder = cache.begin_insert("/a").unwrap();
        cache.abort_insert(placeholder);

        assert_eq!(cache.pin_count("/a"), None);
        assert!(cache.lookup("/a").is_none());
    }

    #[test]
    fn test_commit_keeps_creator_pin() {
        let cache = ObjectCache::new(100, 100);

        let pin = cache.begin_insert("/a").unwrap().commit(vec![7; 9]).unwrap();
        assert_eq!(pin.size(), 9);
        assert_eq!(cache.pin_count("/a"), Some(1));
        assert_eq!(cache.occupied(), 9);

        drop(pin);
        assert_eq!(cache.pin_count("/a"), Some(0));
    }

    #[test]
    fn test_failed_commit_removes_placeholder() {
        let cache = ObjectCache::new(100, 10);

        let result = cache.begin_insert("/big").unwrap().commit(vec![0; 11]);
        assert!(matches!(
            result,
            Err(CacheError::AdmissionFailed {
                reason: AdmissionFailure::ExceedsObjectLimit { .. },
                ..
            })
        ));

        assert_eq!(cache.pin_count("/big"), None);
        assert!(cache.lookup("/big").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_scenario_with_lookup() {
        // Capacity fits two objects
        let cache = ObjectCache::new(20, 10);

        insert(&cache, "A", &[1; 10]);
        insert(&cache, "B", &[2; 10]);
        cache.lookup("A").unwrap().release();
        insert(&cache, "C", &[3; 10]);

        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
        assert!(cache.contains("C"));
        assert_eq!(cache.keys_lru_order(), vec!["A", "C"]);
    }

    #[test]
    fn test_concurrent_begin_insert_single_winner() {
        for _ in 0..50 {
            let cache = ObjectCache::new(100, 100);
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let cache = cache.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        // Keep the placeholder alive until both threads tried
                        let result = cache.begin_insert("/race");
                        barrier.wait();
                        result.is_ok()
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
        }
    }

    #[test]
    fn test_hit_from_other_thread_serves_identical_bytes() {
        let cache = ObjectCache::new(1024, 1024);
        let body: Vec<u8> = (0..=255u8).cycle().take(700).collect();
        insert(&cache, "/obj", &body);

        let reader = cache.clone();
        let fetched = thread::spawn(move || reader.lookup("/obj").map(|pin| pin.body().to_vec()))
            .join()
            .unwrap();

        assert_eq!(fetched.as_deref(), Some(&body[..]));
        assert_eq!(cache.pin_count("/obj"), Some(0));
    }

    #[test]
    fn test_concurrent_mixed_workload_respects_capacity() {
        let cache = ObjectCache::new(500, 100);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("/k{}", (i * 7 + t) % 23);
                        match cache.lookup(&key) {
                            Some(pin) => assert!(!pin.body().is_empty()),
                            None => {
                                if let Ok(placeholder) = cache.begin_insert(&key) {
                                    let size = 10 + (i % 90);
                                    let _ = placeholder.commit(vec![t as u8; size]);
                                }
                            }
                        }
                        assert!(cache.occupied() <= cache.capacity());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.occupied() <= 500);
        // Every pin was dropped
        for key in cache.keys_lru_order() {
            assert_eq!(cache.pin_count(&key), Some(0));
        }
    }
}
