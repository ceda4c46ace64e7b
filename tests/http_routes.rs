use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use premiere_theater::{
    build_router,
    config::AppConfig,
    dao::{models::Premiere, premiere_store::memory::MemoryPremiereStore},
    state::{AppState, SharedState},
    token::{PLAYBACK_AUDIENCE, PlaybackClaims, PlaybackSigner, TokenIssuer},
};
use serde_json::{Value, json};
use time::macros::datetime;
use tower::ServiceExt;

const PRIVATE_KEY: &[u8] = include_bytes!("fixtures/playback_signing_key.pem");
const PUBLIC_KEY: &[u8] = include_bytes!("fixtures/playback_signing_key.pub.pem");

fn premiere() -> Premiere {
    Premiere {
        id: "launch".into(),
        title: "Launch night".into(),
        description: Some("Watched together".into()),
        playback_id: "pb-launch".into(),
        asset_id: None,
        thumbnail_url: None,
        scheduled_at: datetime!(2099-01-01 20:00 UTC),
        is_live: false,
        created_at: None,
    }
}

async fn app_with(tokens: TokenIssuer) -> (Router, SharedState, MemoryPremiereStore) {
    let state = AppState::new(tokens, AppConfig::default());
    let store = MemoryPremiereStore::with_premieres([premiere()]);
    state.install_store(Arc::new(store.clone())).await;
    (build_router(state.clone()), state, store)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn healthcheck_reports_degraded_until_storage_is_installed() {
    let state = AppState::new(TokenIssuer::unsigned(), AppConfig::default());
    let app = build_router(state.clone());

    let (status, body) = call(&app, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "degraded", "realtimeTopics": 0, "signedPlayback": false})
    );

    let (status, _) = call(&app, get("/premieres/launch")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state
        .install_store(Arc::new(MemoryPremiereStore::new()))
        .await;
    let (_, body) = call(&app, get("/healthcheck")).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn playback_token_requires_a_playback_id() {
    let (app, _, _) = app_with(TokenIssuer::unsigned()).await;

    let (status, body) = call(&app, post_json("/playback-token", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("playback id"));

    let (status, _) = call(&app, post_json("/playback-token", json!({"playbackId": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn playback_token_is_null_without_signing_keys() {
    let (app, _, _) = app_with(TokenIssuer::unsigned()).await;

    let (status, body) = call(
        &app,
        post_json("/playback-token", json!({"playbackId": "pb-launch"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"token": null}));
}

#[tokio::test]
async fn playback_token_is_signed_for_the_video_audience() {
    let signer = PlaybackSigner::from_pem("key-1", PRIVATE_KEY).unwrap();
    let (app, _, _) = app_with(TokenIssuer::with_signer(signer)).await;

    let (status, body) = call(
        &app,
        post_json("/playback-token", json!({"playbackId": "pb-launch"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let header = decode_header(token).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some("key-1"));

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[PLAYBACK_AUDIENCE]);
    let claims = decode::<PlaybackClaims>(
        token,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;
    assert_eq!(claims.sub, "pb-launch");
}

#[tokio::test]
async fn premieres_are_served_by_id_and_by_schedule() {
    let (app, _, _) = app_with(TokenIssuer::unsigned()).await;

    let (status, body) = call(&app, get("/premieres/launch")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Launch night");
    assert_eq!(body["playbackId"], "pb-launch");
    assert_eq!(body["scheduledAt"], "2099-01-01T20:00:00Z");

    let (status, body) = call(&app, get("/premieres/upcoming")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "launch");

    let (status, body) = call(&app, get("/premieres/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn upcoming_is_not_found_when_nothing_is_scheduled() {
    let state = AppState::new(TokenIssuer::unsigned(), AppConfig::default());
    state
        .install_store(Arc::new(MemoryPremiereStore::new()))
        .await;
    let app = build_router(state);

    let (status, _) = call(&app, get("/premieres/upcoming")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attendee_registration_is_find_or_insert() {
    let (app, _, store) = app_with(TokenIssuer::unsigned()).await;

    let (status, _) = call(
        &app,
        post_json("/premieres/launch/attendees", json!({"email": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for _ in 0..2 {
        let (status, body) = call(
            &app,
            post_json(
                "/premieres/launch/attendees",
                json!({"email": " Fan@Example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"premiereId": "launch", "email": "fan@example.com"}));
    }
    assert_eq!(store.attendee_count("launch").await, 1);

    let (status, _) = call(
        &app,
        post_json("/premieres/missing/attendees", json!({"email": "fan@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn theater_settings_round_trip_through_the_config_parser() {
    let config = AppConfig::from_json(
        r#"{
            "driftToleranceMs": 600,
            "controlsIdleMs": 4500,
            "sweepIntervalMs": 250,
            "reactions": { "emojis": ["🎉", "🍿"], "lifetimeMs": 6000, "minX": 20, "maxX": 80 }
        }"#,
    )
    .unwrap();
    let state = AppState::new(TokenIssuer::unsigned(), config);
    let app = build_router(state.clone());

    let (status, body) = call(&app, get("/theater-settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driftToleranceMs"], 600);
    assert_eq!(body["reactions"]["emojis"], json!(["🎉", "🍿"]));

    let fetched = AppConfig::from_json(&body.to_string()).unwrap();
    assert_eq!(fetched.theater(), state.config().theater());
}

#[tokio::test]
async fn openapi_document_lists_the_routes() {
    let (app, _, _) = app_with(TokenIssuer::unsigned()).await;

    let (status, body) = call(&app, get("/api-doc/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/healthcheck",
        "/playback-token",
        "/premieres/upcoming",
        "/premieres/{id}",
        "/premieres/{id}/attendees",
        "/realtime/{topic}",
        "/theater-settings",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[cfg(feature = "rest")]
#[tokio::test]
async fn http_token_source_talks_to_the_token_route() {
    use premiere_theater::token::{HttpTokenSource, PlaybackTokenSource};

    let signer = PlaybackSigner::from_pem("key-1", PRIVATE_KEY).unwrap();
    let (app, _, _) = app_with(TokenIssuer::with_signer(signer)).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let source = HttpTokenSource::new(reqwest::Client::new(), &format!("http://{addr}/"));
    let token = source.request_playback_token("pb-launch").await.unwrap();
    assert_eq!(
        decode_header(token.as_deref().unwrap()).unwrap().kid.as_deref(),
        Some("key-1")
    );

    let err = source.request_playback_token("").await.unwrap_err();
    assert!(err.to_string().contains("400"));

    server.abort();
}
