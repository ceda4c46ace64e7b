use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::premiere::{AccessResponse, PremiereResponse, RegisterAttendeeRequest},
    error::AppError,
    services::premiere_service,
    state::SharedState,
};

/// Routes exposing premieres and attendee registration.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/premieres/upcoming", get(upcoming_premiere))
        .route("/premieres/{id}", get(get_premiere))
        .route("/premieres/{id}/attendees", post(register_attendee))
}

/// Next premiere scheduled at or after now.
#[utoipa::path(
    get,
    path = "/premieres/upcoming",
    tag = "premieres",
    responses(
        (status = 200, description = "Upcoming premiere", body = PremiereResponse),
        (status = 404, description = "Nothing scheduled")
    )
)]
pub async fn upcoming_premiere(
    State(state): State<SharedState>,
) -> Result<Json<PremiereResponse>, AppError> {
    let premiere = premiere_service::upcoming(&state).await?;
    Ok(Json(premiere))
}

#[utoipa::path(
    get,
    path = "/premieres/{id}",
    tag = "premieres",
    params(("id" = String, Path, description = "Identifier of the premiere")),
    responses(
        (status = 200, description = "Premiere found", body = PremiereResponse),
        (status = 404, description = "Premiere not found")
    )
)]
pub async fn get_premiere(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PremiereResponse>, AppError> {
    let premiere = premiere_service::by_id(&state, &id).await?;
    Ok(Json(premiere))
}

/// Register an email for a premiere and return its access grant.
#[utoipa::path(
    post,
    path = "/premieres/{id}/attendees",
    tag = "premieres",
    params(("id" = String, Path, description = "Identifier of the premiere")),
    request_body = RegisterAttendeeRequest,
    responses(
        (status = 200, description = "Access granted", body = AccessResponse),
        (status = 400, description = "Invalid email"),
        (status = 404, description = "Premiere not found")
    )
)]
pub async fn register_attendee(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<RegisterAttendeeRequest>>,
) -> Result<Json<AccessResponse>, AppError> {
    let access = premiere_service::register(&state, &id, payload).await?;
    Ok(Json(access))
}
