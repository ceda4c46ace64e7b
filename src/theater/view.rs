use serde::Serialize;

use crate::{
    access::GateState, countdown::TimeRemaining, dao::models::Premiere, reactions::Reaction,
};

use super::state_machine::TheaterPhase;

/// Message of the terminal error view.
pub const NOT_FOUND_MESSAGE: &str = "Premiere not found";

/// Which screen the viewer is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    /// Premiere is being fetched.
    Loading,
    /// Countdown and email gate.
    Lobby,
    /// Player screen.
    Theater,
    /// Terminal error; the only action offered is returning to the start page.
    NotFound { message: String },
}

/// Everything a renderer needs, published after every handled event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TheaterView {
    #[serde(flatten)]
    pub stage: Stage,
    pub phase: TheaterPhase,
    pub premiere: Option<Premiere>,
    pub countdown: Option<TimeRemaining>,
    pub gate: Option<GateState>,
    /// Inline message under the email field.
    pub gate_message: Option<&'static str>,
    pub playback_token: Option<String>,
    pub viewers: usize,
    /// Only populated while playing.
    pub reactions: Vec<Reaction>,
    pub controls_visible: bool,
}

impl Default for TheaterView {
    fn default() -> Self {
        Self {
            stage: Stage::Loading,
            phase: TheaterPhase::Idle,
            premiere: None,
            countdown: None,
            gate: None,
            gate_message: None,
            playback_token: None,
            viewers: 1,
            reactions: Vec::new(),
            controls_visible: true,
        }
    }
}

impl TheaterView {
    pub fn is_live(&self) -> bool {
        self.countdown.is_some_and(|remaining| remaining.is_live)
    }

    pub fn is_granted(&self) -> bool {
        matches!(self.gate, Some(GateState::Granted { .. }))
    }
}
