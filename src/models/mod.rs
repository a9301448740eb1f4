//! Response models for the admin API
//!
//! DTOs serialized as JSON by the stats and health endpoints.

pub mod responses;

pub use responses::{HealthResponse, StatsResponse};
