//! API Handlers
//!
//! Read-only admin endpoints over the shared object cache.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};

use crate::cache::ObjectCache;
use crate::models::{HealthResponse, StatsResponse};

/// Application state shared across all admin handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The proxy's object cache
    pub cache: ObjectCache,
    /// When the proxy started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates a new AppState around the given cache.
    pub fn new(cache: ObjectCache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

/// Handler for GET /stats
///
/// Returns a snapshot of the cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.started_at))
}
