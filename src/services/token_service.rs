use time::OffsetDateTime;
use tracing::{debug, error};

use crate::{
    dto::token::{PlaybackTokenRequest, PlaybackTokenResponse},
    error::ServiceError,
    state::SharedState,
};

/// Sign a playback token for the requested asset.
pub fn issue_playback_token(
    state: &SharedState,
    request: PlaybackTokenRequest,
) -> Result<PlaybackTokenResponse, ServiceError> {
    let playback_id = request.playback_id.unwrap_or_default();
    let token = state
        .tokens()
        .issue(&playback_id, OffsetDateTime::now_utc())
        .map_err(|err| {
            let err = ServiceError::from(err);
            if matches!(err, ServiceError::Signing(_)) {
                error!(playback_id = %playback_id, error = %err, "playback token signing failed");
            }
            err
        })?;

    debug!(playback_id = %playback_id, signed = token.is_some(), "playback token issued");
    Ok(PlaybackTokenResponse { token })
}
