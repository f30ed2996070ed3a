use tracing::warn;

use crate::{
    dto::health::HealthResponse,
    state::{SharedState, coordinator::PLAYBACK_TOPIC},
};

/// Report degraded mode and the playback fan-out size while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.storage().require().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let subscribers = state.broadcaster().subscriber_count(PLAYBACK_TOPIC);
    if state.is_degraded() {
        HealthResponse::degraded(subscribers)
    } else {
        HealthResponse::ok(subscribers)
    }
}
