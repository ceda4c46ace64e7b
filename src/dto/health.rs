use serde::Serialize;
use utoipa::ToSchema;

/// Storage status reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Premiere store installed and answering.
    Ok,
    /// No premiere store; premiere and attendee routes answer 503.
    Degraded,
}

/// Health payload: storage status plus the relay and signing facts a watch party depends on.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Realtime topics currently holding at least one subscriber.
    pub realtime_topics: usize,
    /// Whether playback tokens are signed or handed out as `null`.
    pub signed_playback: bool,
}
