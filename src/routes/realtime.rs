use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::realtime_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/realtime/{topic}",
    tag = "realtime",
    params(("topic" = String, Path, description = "Topic to join, e.g. `lobby:<premiere id>`")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a realtime relay session on `topic`.
pub async fn realtime_handler(
    State(state): State<SharedState>,
    Path(topic): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| realtime_service::handle_socket(state, socket, topic))
}

/// Configure the realtime WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/realtime/{topic}", get(realtime_handler))
}
