/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Premiere lookup and attendee registration.
pub mod premiere_service;
/// WebSocket relay onto the realtime hub.
pub mod realtime_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Playback token issuing.
pub mod token_service;
