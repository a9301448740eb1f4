//! Cache Store Module
//!
//! Single-threaded cache core: a slot arena of entries, a key index and an
//! index-based LRU list kept in agreement. `ObjectCache` wraps it in a lock.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, LruList, MAX_KEY_LENGTH};
use crate::error::{AdmissionFailure, CacheError, Result};

// == Entry Id ==
/// Handle to one entry: its slot plus the generation it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryId {
    slot: usize,
    generation: u64,
}

// == Cache Store ==
/// Byte-capacity bounded object cache with pinning and LRU eviction.
///
/// Invariants kept by every method:
/// - committed bytes never exceed `capacity`
/// - at most one entry (committed or placeholder) per key
/// - pinned entries are never evicted
/// - eviction consumes from the least recently used end
#[derive(Debug)]
pub struct CacheStore {
    /// Entry arena indexed by slot
    slots: Vec<Option<CacheEntry>>,
    /// Slots available for reuse
    free_slots: Vec<usize>,
    /// Key to slot mapping, covers placeholders too
    index: HashMap<String, usize>,
    /// Recency order over occupied slots
    lru: LruList,
    /// Performance statistics
    stats: CacheStats,
    /// Total bytes committed bodies may occupy
    capacity: usize,
    /// Largest single body admitted
    max_object_size: usize,
    /// Bytes held by committed bodies
    occupied: usize,
    /// Committed entry count
    committed: usize,
    next_generation: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `capacity` - Total bytes of committed bodies the cache may hold
    /// * `max_object_size` - Largest single body that may be committed
    pub fn new(capacity: usize, max_object_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            index: HashMap::new(),
            lru: LruList::new(),
            stats: CacheStats::new(capacity),
            capacity,
            max_object_size,
            occupied: 0,
            committed: 0,
            next_generation: 0,
        }
    }

    // == Lookup ==
    /// Finds a committed entry, pins it and marks it most recently used.
    ///
    /// Placeholders still being fetched are reported as misses.
    pub fn lookup(&mut self, key: &str) -> Option<(EntryId, Arc<[u8]>)> {
        let found = self.index.get(key).copied().and_then(|slot| {
            let entry = self.slots[slot].as_mut()?;
            let body = entry.body()?.clone();
            entry.pin();
            Some((
                EntryId {
                    slot,
                    generation: entry.generation(),
                },
                body,
            ))
        });

        match found {
            Some((id, body)) => {
                self.lru.touch(id.slot);
                self.stats.record_hit();
                Some((id, body))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Begin Insert ==
    /// Reserves `key` with an uncommitted placeholder at the MRU position.
    ///
    /// The placeholder carries one pin owned by the caller.
    pub fn begin_insert(&mut self, key: &str) -> Result<EntryId> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::KeyTooLong {
                max: MAX_KEY_LENGTH,
            });
        }
        if self.index.contains_key(key) {
            return Err(CacheError::AlreadyPresent(key.to_string()));
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let entry = CacheEntry::placeholder(key.to_string(), generation);
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.index.insert(key.to_string(), slot);
        self.lru.push_front(slot);
        debug_assert_eq!(self.lru.len(), self.index.len());

        Ok(EntryId { slot, generation })
    }

    // == Commit ==
    /// Turns a placeholder into a cached entry holding `body`.
    ///
    /// Evicts unpinned entries from the LRU end when space is short, in a
    /// single pass. On failure the placeholder is removed. On success the
    /// placeholder's pin is still held and must be released by the caller.
    pub fn commit(&mut self, id: EntryId, body: Vec<u8>) -> Result<Arc<[u8]>> {
        let size = body.len();
        let (key, already_committed) = match self.entry(id) {
            Some(entry) => (entry.key.clone(), entry.is_committed()),
            None => {
                return Err(CacheError::AdmissionFailed {
                    key: String::new(),
                    reason: AdmissionFailure::StaleHandle,
                })
            }
        };
        if already_committed {
            return Err(CacheError::AlreadyPresent(key));
        }

        if let Err(reason) = self.make_room(id, size) {
            self.remove_slot(id.slot);
            self.stats.record_rejection();
            self.refresh_occupancy();
            debug!(key = %key, %reason, "Admission refused");
            return Err(CacheError::AdmissionFailed { key, reason });
        }

        let body: Arc<[u8]> = Arc::from(body);
        if let Some(entry) = self.entry_mut(id) {
            entry.commit(Arc::clone(&body));
        }
        self.occupied += size;
        self.committed += 1;
        self.stats.record_admission();
        self.refresh_occupancy();

        debug!(key = %key, size, occupied = self.occupied, "Entry committed");
        Ok(body)
    }

    // == Abort Insert ==
    /// Discards an uncommitted placeholder unconditionally.
    pub fn abort_insert(&mut self, id: EntryId) {
        let is_placeholder = self.entry(id).is_some_and(|e| !e.is_committed());
        if is_placeholder {
            self.remove_slot(id.slot);
        }
    }

    // == Release ==
    /// Drops one pin from the entry.
    pub fn release(&mut self, id: EntryId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.unpin();
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    // == Inspection ==
    /// Returns true if `key` has a committed entry. Does not touch recency.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some_and(CacheEntry::is_committed)
    }

    /// Returns true if `key` has any entry, including a placeholder.
    pub fn is_reserved(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Current pin count for `key`, if it has an entry.
    pub fn pin_count(&self, key: &str) -> Option<usize> {
        self.peek(key).map(CacheEntry::pin_count)
    }

    /// Keys of committed entries from least to most recently used.
    pub fn keys_lru_order(&self) -> Vec<String> {
        self.lru
            .iter_oldest_first()
            .filter_map(|slot| self.slots[slot].as_ref())
            .filter(|e| e.is_committed())
            .map(|e| e.key.clone())
            .collect()
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.committed
    }

    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Bytes held by committed entries.
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    // == Internals ==

    /// Frees enough space for `size` bytes, or explains why it cannot.
    fn make_room(&mut self, id: EntryId, size: usize) -> std::result::Result<(), AdmissionFailure> {
        if size > self.max_object_size {
            return Err(AdmissionFailure::ExceedsObjectLimit {
                size,
                limit: self.max_object_size,
            });
        }
        if size > self.capacity {
            return Err(AdmissionFailure::ExceedsCapacity {
                size,
                capacity: self.capacity,
            });
        }

        // One pass from the tail toward the head; pinned entries and
        // placeholders are stepped over.
        let mut cursor = self.lru.peek_oldest();
        while self.free_space() < size {
            let Some(slot) = cursor else { break };
            cursor = self.lru.newer(slot);

            if slot == id.slot {
                continue;
            }
            let evictable = self.slots[slot]
                .as_ref()
                .is_some_and(CacheEntry::is_evictable);
            if evictable {
                self.evict(slot);
            }
        }

        let available = self.free_space();
        if available < size {
            return Err(AdmissionFailure::InsufficientSpace { size, available });
        }
        Ok(())
    }

    fn evict(&mut self, slot: usize) {
        if let Some(entry) = self.remove_slot(slot) {
            self.stats.record_eviction();
            debug!(key = %entry.key, size = entry.size(), "Evicted entry");
        }
    }

    /// Removes a slot from the arena, index and LRU list, fixing accounting.
    fn remove_slot(&mut self, slot: usize) -> Option<CacheEntry> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.key);
        self.lru.remove(slot);
        self.free_slots.push(slot);
        debug_assert_eq!(self.lru.len(), self.index.len());

        if entry.is_committed() {
            self.occupied -= entry.size();
            self.committed -= 1;
            self.refresh_occupancy();
        }
        Some(entry)
    }

    fn free_space(&self) -> usize {
        self.capacity - self.occupied
    }

    fn refresh_occupancy(&mut self) {
        self.stats.set_occupancy(self.committed, self.occupied);
    }

    fn peek(&self, key: &str) -> Option<&CacheEntry> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref()
    }

    fn entry(&self, id: EntryId) -> Option<&CacheEntry> {
        self.slots
            .get(id.slot)?
            .as_ref()
            .filter(|e| e.generation() == id.generation)
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry> {
        self.slots
            .get_mut(id.slot)?
            .as_mut()
            .filter(|e| e.generation() == id.generation)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    /// Inserts and commits `key`, releasing the creator's pin.
    fn put(store: &mut CacheStore, key: &str, size: usize) -> Result<()> {
        let id = store.begin_insert(key)?;
        store.commit(id, vec![b'x'; size])?;
        store.release(id);
        Ok(())
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::new(100, 50);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.occupied(), 0);
        assert_eq!(store.capacity(), 100);
        assert_eq!(store.max_object_size(), 50);
    }

    #[test]
    fn test_lookup_empty_cache_is_miss() {
        let mut store = CacheStore::new(100, 50);
        assert!(store.lookup("/a").is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_insert_commit_lookup() {
        let mut store = CacheStore::new(100, 50);

        let id = store.begin_insert("/a").unwrap();
        let stored = store.commit(id, b"hello".to_vec()).unwrap();
        assert_eq!(&stored[..], b"hello");
        store.release(id);

        let (hit, body) = store.lookup("/a").unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(store.pin_count("/a"), Some(1));
        store.release(hit);

        assert_eq!(store.pin_count("/a"), Some(0));
        assert_eq!(store.occupied(), 5);
        assert_eq!(store.len(), 1);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.admissions, 1);
        assert_eq!(stats.occupied_bytes, 5);
    }

    #[test]
    fn test_placeholder_is_invisible_to_lookup() {
        let mut store = CacheStore::new(100, 50);

        let id = store.begin_insert("/a").unwrap();

        assert!(store.lookup("/a").is_none());
        assert!(!store.contains("/a"));
        assert!(store.is_reserved("/a"));
        assert_eq!(store.occupied(), 0);

        store.abort_insert(id);
    }

    #[test]
    fn test_begin_insert_twice_is_already_present() {
        let mut store = CacheStore::new(100, 50);

        let id = store.begin_insert("/a").unwrap();
        assert_eq!(
            store.begin_insert("/a"),
            Err(CacheError::AlreadyPresent("/a".to_string()))
        );

        store.commit(id, vec![1, 2, 3]).unwrap();
        store.release(id);
        assert!(matches!(
            store.begin_insert("/a"),
            Err(CacheError::AlreadyPresent(_))
        ));
    }

    #[test]
    fn test_begin_insert_key_too_long() {
        let mut store = CacheStore::new(100, 50);
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        let result = store.begin_insert(&long_key);
        assert!(matches!(result, Err(CacheError::KeyTooLong { .. })));
        assert!(!store.is_reserved(&long_key));
    }

    #[test]
    fn test_abort_insert_frees_key() {
        let mut store = CacheStore::new(100, 50);

        let id = store.begin_insert("/a").unwrap();
        store.abort_insert(id);

        assert!(!store.is_reserved("/a"));
        assert!(store.begin_insert("/a").is_ok());
    }

    #[test]
    fn test_abort_insert_ignores_committed_entry() {
        let mut store = CacheStore::new(100, 50);

        let id = store.begin_insert("/a").unwrap();
        store.commit(id, vec![0; 4]).unwrap();
        store.abort_insert(id);

        assert!(store.contains("/a"));
    }

    #[test]
    fn test_commit_exceeding_object_limit_leaves_cache_unchanged() {
        let mut store = CacheStore::new(100, 10);
        put(&mut store, "/small", 8).unwrap();

        let id = store.begin_insert("/big").unwrap();
        let result = store.commit(id, vec![0; 11]);

        assert!(matches!(
            result,
            Err(CacheError::AdmissionFailed {
                reason: AdmissionFailure::ExceedsObjectLimit { size: 11, limit: 10 },
                ..
            })
        ));
        assert!(!store.is_reserved("/big"));
        assert!(store.lookup("/big").is_none());
        assert!(store.contains("/small"));
        assert_eq!(store.occupied(), 8);
        assert_eq!(store.stats().rejections, 1);
    }

    #[test]
    fn test_commit_exceeding_capacity_fails_outright() {
        let mut store = CacheStore::new(10, 100);
        put(&mut store, "/a", 5).unwrap();

        let id = store.begin_insert("/big").unwrap();
        let result = store.commit(id, vec![0; 11]);

        assert!(matches!(
            result,
            Err(CacheError::AdmissionFailed {
                reason: AdmissionFailure::ExceedsCapacity { .. },
                ..
            })
        ));
        // Nothing was evicted for a body that could never fit
        assert!(store.contains("/a"));
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_commit_exactly_fills_capacity() {
        let mut store = CacheStore::new(10, 10);
        put(&mut store, "/a", 10).unwrap();

        assert_eq!(store.occupied(), 10);
        assert!(store.contains("/a"));
    }

    #[test]
    fn test_lru_eviction_order() {
        // Room for exactly two 10-byte objects
        let mut store = CacheStore::new(20, 10);

        put(&mut store, "A", 10).unwrap();
        put(&mut store, "B", 10).unwrap();
        put(&mut store, "C", 10).unwrap();

        // C evicted A
        assert!(!store.contains("A"));
        assert_eq!(store.keys_lru_order(), vec!["B", "C"]);
    }

    #[test]
    fn test_lookup_promotes_entry() {
        let mut store = CacheStore::new(20, 10);

        put(&mut store, "A", 10).unwrap();
        put(&mut store, "B", 10).unwrap();

        let (id, _) = store.lookup("A").unwrap();
        store.release(id);

        put(&mut store, "C", 10).unwrap();

        // B was least recently used after A's lookup
        assert!(store.contains("A"));
        assert!(!store.contains("B"));
        assert!(store.contains("C"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_pinned_entry_is_skipped_by_eviction() {
        let mut store = CacheStore::new(30, 10);

        put(&mut store, "A", 10).unwrap();
        put(&mut store, "B", 10).unwrap();
        put(&mut store, "C", 10).unwrap();

        // Pin A, the LRU entry
        let (pin, _) = store.lookup("A").unwrap();
        // Make A the oldest again by touching the others
        for key in ["B", "C"] {
            let (id, _) = store.lookup(key).unwrap();
            store.release(id);
        }
        assert_eq!(store.keys_lru_order(), vec!["A", "B", "C"]);

        put(&mut store, "D", 10).unwrap();

        assert!(store.contains("A"));
        assert!(!store.contains("B"));
        assert!(store.contains("C"));
        assert!(store.contains("D"));

        store.release(pin);
    }

    #[test]
    fn test_all_pinned_fails_admission() {
        let mut store = CacheStore::new(20, 10);

        put(&mut store, "A", 10).unwrap();
        put(&mut store, "B", 10).unwrap();

        let (pin_a, _) = store.lookup("A").unwrap();
        let (pin_b, _) = store.lookup("B").unwrap();

        let id = store.begin_insert("C").unwrap();
        let result = store.commit(id, vec![0; 10]);

        assert!(matches!(
            result,
            Err(CacheError::AdmissionFailed {
                reason: AdmissionFailure::InsufficientSpace { size: 10, available: 0 },
                ..
            })
        ));
        assert!(store.contains("A"));
        assert!(store.contains("B"));
        assert!(!store.is_reserved("C"));
        assert_eq!(store.occupied(), 20);

        store.release(pin_a);
        store.release(pin_b);

        // Once released, the same insert succeeds
        put(&mut store, "C", 10).unwrap();
        assert!(store.contains("C"));
    }

    #[test]
    fn test_failed_scan_keeps_its_evictions() {
        let mut store = CacheStore::new(30, 20);

        put(&mut store, "A", 10).unwrap();
        put(&mut store, "B", 10).unwrap();
        put(&mut store, "C", 10).unwrap();

        let (pin_b, _) = store.lookup("B").unwrap();
        let (pin_c, _) = store.lookup("C").unwrap();

        // Needs 20 bytes; only A (10) can go
        let id = store.begin_insert("D").unwrap();
        assert!(store.commit(id, vec![0; 20]).is_err());

        assert!(!store.contains("A"));
        assert_eq!(store.occupied(), 20);
        assert_eq!(store.stats().evictions, 1);

        store.release(pin_b);
        store.release(pin_c);
    }

    #[test]
    fn test_eviction_skips_other_placeholders() {
        let mut store = CacheStore::new(20, 10);

        put(&mut store, "A", 10).unwrap();
        let pending = store.begin_insert("P").unwrap();
        put(&mut store, "B", 10).unwrap();
        put(&mut store, "C", 10).unwrap();

        assert!(store.is_reserved("P"));
        assert!(!store.contains("A"));

        store.abort_insert(pending);
    }

    #[test]
    fn test_slot_reuse_invalidates_old_id() {
        let mut store = CacheStore::new(100, 50);

        let old = store.begin_insert("/a").unwrap();
        store.abort_insert(old);

        let new = store.begin_insert("/b").unwrap();
        assert_ne!(old, new);

        // The stale handle cannot touch the entry now in the same slot
        store.release(old);
        assert_eq!(store.pin_count("/b"), Some(1));
        assert!(matches!(
            store.commit(old, vec![1]),
            Err(CacheError::AdmissionFailed {
                reason: AdmissionFailure::StaleHandle,
                ..
            })
        ));
        assert!(store.is_reserved("/b"));
    }

    #[test]
    fn test_release_makes_entry_evictable() {
        let mut store = CacheStore::new(10, 10);

        let id = store.begin_insert("A").unwrap();
        store.commit(id, vec![0; 10]).unwrap();

        // Creator's pin still held, B cannot be admitted
        let b = store.begin_insert("B").unwrap();
        assert!(store.commit(b, vec![0; 10]).is_err());

        store.release(id);
        assert_eq!(store.pin_count("A"), Some(0));

        put(&mut store, "B", 10).unwrap();
        assert!(!store.contains("A"));
        assert!(store.contains("B"));
    }
}
