//! Video player capability used by the theater and the ambient mirror.

mod memory;
pub mod sync;

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

pub use self::memory::{MemoryPlayer, PlayerCommand};
pub use self::sync::{DualPlayerSync, Reconciliation};

/// Failures reported by a player.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    /// The platform refused the command, e.g. autoplay blocked.
    #[error("playback rejected by policy: {0}")]
    PolicyRejected(String),
    /// The player cannot execute commands right now.
    #[error("player unavailable: {0}")]
    Unavailable(String),
}

impl PlayerError {
    /// Autoplay-style refusals are expected and only logged at debug.
    pub fn is_policy(&self) -> bool {
        matches!(self, PlayerError::PolicyRejected(_))
    }
}

/// Events emitted by the main player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback started or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// End of stream reached.
    Ended,
}

/// Minimal control surface of a video player.
pub trait VideoPlayer: Send + Sync {
    /// Start or resume playback; may be refused by autoplay policy.
    fn play(&self) -> BoxFuture<'_, Result<(), PlayerError>>;

    /// Pause at the current position.
    fn pause(&self) -> BoxFuture<'_, Result<(), PlayerError>>;

    /// Jump to `position` from the start of the stream.
    fn seek(&self, position: Duration) -> BoxFuture<'_, Result<(), PlayerError>>;

    /// Current playback position.
    fn position(&self) -> Duration;
}
