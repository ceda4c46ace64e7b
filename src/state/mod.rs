use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};
use tokio::time::timeout;

use crate::{
    config::AppConfig, dao::premiere_store::PremiereStore, error::ServiceError,
    realtime::LocalHub, token::TokenIssuer,
};

pub type SharedState = Arc<AppState>;

/// Central application state shared by every route.
pub struct AppState {
    store: RwLock<Option<Arc<dyn PremiereStore>>>,
    hub: LocalHub,
    tokens: TokenIssuer,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(tokens: TokenIssuer, config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            hub: LocalHub::default(),
            tokens,
            config,
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current premiere store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn PremiereStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current premiere store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn PremiereStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new premiere store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn PremiereStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current premiere store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Realtime topics relayed over WebSocket.
    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run a storage call under the configured load timeout.
    pub async fn with_timeout<T, Fut>(&self, work: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let limit: Duration = self.config.theater().load_timeout;
        timeout(limit, work)
            .await
            .map_err(|_| ServiceError::Timeout)?
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
