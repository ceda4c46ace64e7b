//! Library crate for premiere-theater: the viewing-session core and the HTTP service behind it.

pub mod access;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod dao;
pub mod dto;
pub mod error;
pub mod player;
pub mod presence;
pub mod reactions;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;
pub mod theater;
pub mod token;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the top-level router and attach cross-cutting middleware layers.
pub fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
