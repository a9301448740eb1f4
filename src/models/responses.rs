//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that went upstream
    pub misses: u64,
    /// Entries evicted to make room
    pub evictions: u64,
    /// Responses committed to the cache
    pub admissions: u64,
    /// Responses refused by admission
    pub rejections: u64,
    /// Committed entries currently cached
    pub total_entries: usize,
    /// Bytes held by cached responses
    pub occupied_bytes: usize,
    /// Total cache capacity in bytes
    pub capacity_bytes: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            admissions: stats.admissions,
            rejections: stats.rejections,
            total_entries: stats.total_entries,
            occupied_bytes: stats.occupied_bytes,
            capacity_bytes: stats.capacity_bytes,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Seconds since the proxy started
    pub uptime_secs: i64,
}

impl HealthResponse {
    /// Creates a new HealthResponse for a process started at `started_at`
    pub fn healthy(started_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            status: "healthy".to_string(),
            timestamp: now.to_rfc3339(),
            uptime_secs: (now - started_at).num_seconds().max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stats_response_from_cache_stats() {
        let mut stats = CacheStats::new(1000);
        stats.hits = 80;
        stats.misses = 20;
        stats.set_occupancy(3, 420);

        let resp = StatsResponse::from(stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.total_entries, 3);
        assert_eq!(resp.occupied_bytes, 420);
        assert_eq!(resp.capacity_bytes, 1000);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::from(CacheStats::new(0));
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy(Utc::now() - Duration::seconds(90));
        assert!(resp.uptime_secs >= 90);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
        assert!(json.contains("uptime_secs"));
    }
}
