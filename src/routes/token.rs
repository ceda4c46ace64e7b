use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::token::{PlaybackTokenRequest, PlaybackTokenResponse},
    error::AppError,
    services::token_service,
    state::SharedState,
};

/// Routes issuing signed playback tokens.
pub fn router() -> Router<SharedState> {
    Router::new().route("/playback-token", post(playback_token))
}

/// Sign a playback token, or return `null` when signing is not configured.
#[utoipa::path(
    post,
    path = "/playback-token",
    tag = "playback",
    request_body = PlaybackTokenRequest,
    responses(
        (status = 200, description = "Token issued (null without signing keys)", body = PlaybackTokenResponse),
        (status = 400, description = "Missing playbackId"),
        (status = 500, description = "Signing failed")
    )
)]
pub async fn playback_token(
    State(state): State<SharedState>,
    Json(payload): Json<PlaybackTokenRequest>,
) -> Result<Json<PlaybackTokenResponse>, AppError> {
    let response = token_service::issue_playback_token(&state, payload)?;
    Ok(Json(response))
}
