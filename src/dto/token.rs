use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /playback-token`.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackTokenRequest {
    /// Playback id of the asset to sign for.
    #[serde(default)]
    pub playback_id: Option<String>,
}

/// Signed token, or `null` when the server has no signing key configured.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PlaybackTokenResponse {
    pub token: Option<String>,
}
