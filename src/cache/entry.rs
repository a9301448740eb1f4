//! Cache Entry Module
//!
//! Defines a single cached response and its pin bookkeeping.

use std::sync::Arc;

// == Cache Entry ==
/// One cached response, keyed by request URI.
///
/// An entry starts as an uncommitted placeholder (no body) and becomes
/// committed once the full response is known. Only committed entries are
/// visible to lookups and count toward occupied capacity.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URI this entry caches
    pub key: String,
    /// Complete response bytes, `None` while uncommitted
    body: Option<Arc<[u8]>>,
    /// Number of in-flight users depending on this entry
    pin_count: usize,
    /// Distinguishes reuses of the same slot
    generation: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an uncommitted placeholder holding one pin for its creator.
    pub fn placeholder(key: String, generation: u64) -> Self {
        Self {
            key,
            body: None,
            pin_count: 1,
            generation,
        }
    }

    // == Commit ==
    /// Attaches the response body, making the entry visible to lookups.
    pub fn commit(&mut self, body: Arc<[u8]>) {
        self.body = Some(body);
    }

    pub fn is_committed(&self) -> bool {
        self.body.is_some()
    }

    /// Returns the body if committed.
    pub fn body(&self) -> Option<&Arc<[u8]>> {
        self.body.as_ref()
    }

    // == Size ==
    /// Byte length of the body; 0 while uncommitted.
    pub fn size(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.len())
    }

    // == Pinning ==
    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Drops one pin. Unbalanced releases are a caller bug.
    pub fn unpin(&mut self) {
        debug_assert!(self.pin_count > 0, "release without a matching pin");
        self.pin_count = self.pin_count.saturating_sub(1);
    }

    pub fn pin_count(&self) -> usize {
        self.pin_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // == Is Evictable ==
    /// A committed entry nobody is pinning may be evicted.
    pub fn is_evictable(&self) -> bool {
        self.is_committed() && self.pin_count == 0
    }
}
