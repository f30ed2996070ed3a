use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Live subscribers of the playback topic.
    pub subscribers: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(subscribers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            subscribers,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(subscribers: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            subscribers,
        }
    }
}
