//! Viewing session orchestration: countdown, gate, players, reactions and presence.

mod controller;
mod runtime;
pub mod state_machine;
mod view;

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    access::AccessCache,
    clock::Clock,
    dao::{premiere_store::PremiereStore, storage::StorageError},
    player::{PlayerEvent, VideoPlayer},
    realtime::Realtime,
    token::{PlaybackTokenSource, TokenError},
};

pub use self::controller::TheaterController;
pub use self::runtime::{Command, TheaterHandle, TheaterRuntime};
pub use self::state_machine::{TheaterEvent, TheaterPhase, TheaterStateMachine};
pub use self::view::{NOT_FOUND_MESSAGE, Stage, TheaterView};

/// Errors surfaced by a viewing session.
#[derive(Debug, Error)]
pub enum TheaterError {
    /// The session task has stopped.
    #[error("theater session is closed")]
    Closed,
    /// A premiere or token load exceeded the load timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Collaborators of one viewing session.
#[derive(Clone)]
pub struct TheaterDeps {
    /// Premiere lookup and attendee registration.
    pub store: Arc<dyn PremiereStore>,
    /// Transport for the lobby and reaction channels.
    pub realtime: Arc<dyn Realtime>,
    pub tokens: Arc<dyn PlaybackTokenSource>,
    /// Remembered access grants, keyed by premiere.
    pub cache: Arc<dyn AccessCache>,
    pub clock: Arc<dyn Clock>,
    /// Foreground player the viewer controls.
    pub main: Arc<dyn VideoPlayer>,
    /// Muted background layer mirroring `main`.
    pub ambient: Arc<dyn VideoPlayer>,
}

impl From<PlayerEvent> for Command {
    fn from(event: PlayerEvent) -> Self {
        Command::Player(event)
    }
}
