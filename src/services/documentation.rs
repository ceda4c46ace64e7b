use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the premiere theater service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::token::playback_token,
        crate::routes::premieres::upcoming_premiere,
        crate::routes::premieres::get_premiere,
        crate::routes::premieres::register_attendee,
        crate::routes::realtime::realtime_handler,
        crate::routes::theater::theater_settings,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::token::PlaybackTokenRequest,
            crate::dto::token::PlaybackTokenResponse,
            crate::dto::premiere::PremiereResponse,
            crate::dto::premiere::RegisterAttendeeRequest,
            crate::dto::premiere::AccessResponse,
            crate::dto::realtime::RealtimeInboundMessage,
            crate::dto::realtime::RealtimeOutboundMessage,
            crate::dto::theater::TheaterSettingsResponse,
            crate::dto::theater::ReactionSettingsResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "playback", description = "Signed playback tokens"),
        (name = "premieres", description = "Premiere lookup and registration"),
        (name = "realtime", description = "WebSocket relay for reactions and presence"),
        (name = "theater", description = "Settings for viewing clients"),
    )
)]
pub struct ApiDoc;
