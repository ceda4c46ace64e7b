use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Ping the premiere store and summarise what viewers can currently rely on.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let status = match state.store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => HealthStatus::Ok,
            Err(err) => {
                warn!(error = %err, "premiere store health check failed");
                HealthStatus::Degraded
            }
        },
        None => {
            warn!("no premiere store installed (degraded mode)");
            HealthStatus::Degraded
        }
    };

    HealthResponse {
        status,
        realtime_topics: state.hub().topic_count(),
        signed_playback: state.tokens().is_signing(),
    }
}
