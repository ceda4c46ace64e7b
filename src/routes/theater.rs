use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::theater::TheaterSettingsResponse, state::SharedState};

/// Reaction set, drift tolerance and timer cadences viewing clients should run with.
#[utoipa::path(
    get,
    path = "/theater-settings",
    tag = "theater",
    responses((status = 200, description = "Configured theater settings", body = TheaterSettingsResponse))
)]
pub async fn theater_settings(State(state): State<SharedState>) -> Json<TheaterSettingsResponse> {
    Json(state.config().theater().into())
}

pub fn router() -> Router<SharedState> {
    Router::new().route("/theater-settings", get(theater_settings))
}
