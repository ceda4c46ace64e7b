use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, sleep_until},
};
use tracing::debug;

use crate::{config::TheaterSettings, player::PlayerEvent};

use super::{TheaterDeps, TheaterError, controller::TheaterController, view::TheaterView};

/// Inputs accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Try to move from the lobby into the theater.
    Enter,
    /// Submit the email gate.
    Submit(String),
    /// Start playback from the intro or a pause.
    Start,
    /// Watch again after the end.
    Replay,
    /// Send an emoji reaction.
    React(String),
    /// Mouse or touch activity over the player.
    PointerActivity,
    /// Event reported by the main player.
    Player(PlayerEvent),
    /// Tear everything down and stop.
    Shutdown,
}

/// Event loop owning a [`TheaterController`].
pub struct TheaterRuntime {
    controller: TheaterController,
    commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<TheaterView>,
}

impl TheaterRuntime {
    /// Spawn a session for `premiere_id` on the current tokio runtime.
    pub fn spawn(
        premiere_id: impl Into<String>,
        deps: TheaterDeps,
        settings: TheaterSettings,
    ) -> TheaterHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(TheaterView::default());
        let runtime = Self {
            controller: TheaterController::new(premiere_id, deps, settings),
            commands,
            view,
        };

        TheaterHandle {
            commands: commands_tx,
            view: view_rx,
            task: tokio::spawn(runtime.run()),
        }
    }

    async fn run(mut self) {
        let settings = self.controller.settings().clone();
        let mut countdown = interval(settings.countdown_interval);
        let mut sweep = interval(settings.sweep_interval);
        let mut reconcile = interval(settings.reconcile_interval);
        for timer in [&mut countdown, &mut sweep, &mut reconcile] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        self.controller.open();
        self.publish();

        loop {
            let controls_deadline = self.controller.controls_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.dispatch(command).await,
                },
                signal = self.controller.next_signal() => self.controller.on_signal(signal).await,
                _ = countdown.tick() => self.controller.tick(),
                _ = sweep.tick() => self.controller.sweep(),
                _ = reconcile.tick() => self.controller.reconcile().await,
                _ = sleep_until(controls_deadline.unwrap_or_else(Instant::now)), if controls_deadline.is_some() => {
                    self.controller.hide_idle_controls()
                }
            }
            self.publish();
        }

        self.controller.teardown().await;
        self.publish();
        debug!("theater runtime stopped");
    }

    async fn dispatch(&mut self, command: Command) {
        let controller = &mut self.controller;
        match command {
            Command::Enter => controller.enter(),
            Command::Submit(email) => controller.submit(&email),
            Command::Start => controller.start().await,
            Command::Replay => controller.replay().await,
            Command::React(emoji) => controller.react(&emoji),
            Command::PointerActivity => controller.pointer_activity(),
            Command::Player(event) => controller.player_event(event).await,
            Command::Shutdown => {}
        }
    }

    fn publish(&self) {
        let next = self.controller.view();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Client side of a running session. Dropping it shuts the session down.
pub struct TheaterHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<TheaterView>,
    task: JoinHandle<()>,
}

impl TheaterHandle {
    /// Queue `command`; fails with [`TheaterError::Closed`] once the session stopped.
    pub fn send(&self, command: impl Into<Command>) -> Result<(), TheaterError> {
        self.commands
            .send(command.into())
            .map_err(|_| TheaterError::Closed)
    }

    /// See [`Command::Enter`].
    pub fn enter(&self) -> Result<(), TheaterError> {
        self.send(Command::Enter)
    }

    /// See [`Command::Submit`].
    pub fn submit(&self, email: impl Into<String>) -> Result<(), TheaterError> {
        self.send(Command::Submit(email.into()))
    }

    /// See [`Command::Start`].
    pub fn start(&self) -> Result<(), TheaterError> {
        self.send(Command::Start)
    }

    /// See [`Command::Replay`].
    pub fn replay(&self) -> Result<(), TheaterError> {
        self.send(Command::Replay)
    }

    /// See [`Command::React`].
    pub fn react(&self, emoji: impl Into<String>) -> Result<(), TheaterError> {
        self.send(Command::React(emoji.into()))
    }

    /// See [`Command::PointerActivity`].
    pub fn pointer_activity(&self) -> Result<(), TheaterError> {
        self.send(Command::PointerActivity)
    }

    /// Forward an event of the main player.
    pub fn player_event(&self, event: PlayerEvent) -> Result<(), TheaterError> {
        self.send(event)
    }

    /// Latest published view.
    pub fn view(&self) -> TheaterView {
        self.view.borrow().clone()
    }

    /// Independent receiver of view updates.
    pub fn subscribe(&self) -> watch::Receiver<TheaterView> {
        self.view.clone()
    }

    /// Wait until the published view satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&TheaterView) -> bool,
    ) -> Result<TheaterView, TheaterError> {
        self.view
            .wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| TheaterError::Closed)
    }

    /// Stop the session and return its final view.
    pub async fn shutdown(self) -> Result<TheaterView, TheaterError> {
        let _ = self.commands.send(Command::Shutdown);
        self.task.await.map_err(|_| TheaterError::Closed)?;
        let view = self.view.borrow().clone();
        Ok(view)
    }
}
