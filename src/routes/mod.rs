use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod premieres;
pub mod realtime;
pub mod theater;
pub mod token;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(token::router())
        .merge(premieres::router())
        .merge(realtime::router())
        .merge(theater::router())
        .merge(docs::router());

    api_router.with_state(state)
}
