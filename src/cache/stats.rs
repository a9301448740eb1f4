//! Cache Statistics Module
//!
//! Tracks cache performance and occupancy.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups that found a committed entry
    pub hits: u64,
    /// Lookups that found nothing or only a placeholder
    pub misses: u64,
    /// Entries removed by the LRU scan
    pub evictions: u64,
    /// Placeholders successfully committed
    pub admissions: u64,
    /// Placeholders discarded by a failed commit
    pub rejections: u64,
    /// Committed entries currently cached
    pub total_entries: usize,
    /// Sum of committed body sizes
    pub occupied_bytes: usize,
    /// Total capacity in bytes
    pub capacity_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats for a cache of the given capacity.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_admission(&mut self) {
        self.admissions += 1;
    }

    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    // == Update Occupancy ==
    /// Updates the committed entry count and occupied bytes.
    pub fn set_occupancy(&mut self, entries: usize, bytes: usize) {
        self.total_entries = entries;
        self.occupied_bytes = bytes;
    }
}
