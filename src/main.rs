//! premiere-theater binary entrypoint wiring REST, WebSocket relay and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use premiere_theater::{
    build_router,
    config::AppConfig,
    dao::{
        premiere_store::{PremiereStore, memory::MemoryPremiereStore},
        storage::StorageError,
    },
    services::storage_supervisor,
    state::{AppState, SharedState},
    token::TokenIssuer,
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let tokens = TokenIssuer::from_env();
    let app_state = AppState::new(tokens, config);

    spawn_storage(app_state.clone());
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor: the REST store when configured, otherwise the in-memory store
/// seeded from the config file.
fn spawn_storage(state: SharedState) {
    #[cfg(feature = "rest")]
    {
        use premiere_theater::dao::premiere_store::rest::{RestConfig, RestPremiereStore};

        match RestConfig::from_env() {
            Ok(config) => {
                info!(base_url = %config.base_url, "using REST premiere store");
                tokio::spawn(storage_supervisor::run(state, move || {
                    let config = config.clone();
                    async move {
                        let store = RestPremiereStore::connect(config)
                            .await
                            .map_err(StorageError::from)?;
                        Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PremiereStore>)
                    }
                }));
                return;
            }
            Err(err) => warn!(error = %err, "REST storage not configured; using in-memory store"),
        }
    }

    let store = MemoryPremiereStore::with_premieres(state.config().premieres().to_vec());
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PremiereStore>) }
    }));
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
