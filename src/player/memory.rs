use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::{self, BoxFuture};

use super::{PlayerError, VideoPlayer};

/// Command received by a [`MemoryPlayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Seek(Duration),
}

#[derive(Default)]
struct Inner {
    position: Duration,
    playing: bool,
    commands: Vec<PlayerCommand>,
    failure: Option<PlayerError>,
}

/// Headless player recording every command; used where no real decoder is attached.
#[derive(Default)]
pub struct MemoryPlayer {
    inner: Mutex<Inner>,
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Player already positioned at `position`.
    pub fn at(position: Duration) -> Self {
        let player = Self::new();
        player.set_position(position);
        player
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_position(&self, position: Duration) {
        self.lock().position = position;
    }

    /// Make every following command fail with `failure` (or succeed again with `None`).
    pub fn fail_with(&self, failure: Option<PlayerError>) {
        self.lock().failure = failure;
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    fn execute(&self, command: PlayerCommand) -> Result<(), PlayerError> {
        let mut inner = self.lock();
        inner.commands.push(command);
        if let Some(failure) = inner.failure.clone() {
            return Err(failure);
        }
        match command {
            PlayerCommand::Play => inner.playing = true,
            PlayerCommand::Pause => inner.playing = false,
            PlayerCommand::Seek(position) => inner.position = position,
        }
        Ok(())
    }
}

impl VideoPlayer for MemoryPlayer {
    fn play(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        Box::pin(future::ready(self.execute(PlayerCommand::Play)))
    }

    fn pause(&self) -> BoxFuture<'_, Result<(), PlayerError>> {
        Box::pin(future::ready(self.execute(PlayerCommand::Pause)))
    }

    fn seek(&self, position: Duration) -> BoxFuture<'_, Result<(), PlayerError>> {
        Box::pin(future::ready(self.execute(PlayerCommand::Seek(position))))
    }

    fn position(&self) -> Duration {
        self.lock().position
    }
}
