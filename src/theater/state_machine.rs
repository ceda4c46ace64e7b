use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Phases of the viewing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TheaterPhase {
    /// Nothing loaded for the theater yet; the viewer is in the lobby.
    Idle,
    /// Premiere and playback token are loaded; waiting for playback to start.
    Intro,
    /// Main player is playing.
    Playing,
    /// Main player is paused.
    Paused,
    /// Main player reached the end of the stream.
    Ended,
}

impl TheaterPhase {
    /// Only `playing` shows and sends reactions.
    pub fn is_playing(self) -> bool {
        self == TheaterPhase::Playing
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TheaterEvent {
    /// Premiere and optional playback token finished loading.
    Loaded,
    /// Playback started, by the viewer or by the player itself.
    Play,
    /// Main player paused.
    Pause,
    /// Main player reached end-of-stream.
    Ended,
    /// Viewer asked to watch again.
    Replay,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the event was applied in.
    pub from: TheaterPhase,
    /// Rejected event.
    pub event: TheaterEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a transition is already pending")]
    AlreadyPending,
    /// The event is not accepted in the current phase.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Nothing was planned.
    #[error("no transition is pending")]
    NoPending,
    /// Another plan is pending; it stays pending.
    #[error("pending plan is {expected}, got {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
    /// The phase moved since the plan was made.
    #[error("phase changed during transition (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        expected: TheaterPhase,
        actual: TheaterPhase,
    },
    /// Another transition was applied since the plan was made.
    #[error("version changed during transition (expected {expected}, got {actual})")]
    VersionMismatch { expected: usize, actual: usize },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// Nothing was planned.
    #[error("no transition is pending")]
    NoPending,
    /// Another plan is pending; it is left in place.
    #[error("pending plan is {expected}, got {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition waiting for its side work to finish.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub from: TheaterPhase,
    pub to: TheaterPhase,
    /// Event that produced the plan.
    pub event: TheaterEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// When the plan was made.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: TheaterPhase,
    /// Increments on each applied transition.
    pub version: usize,
    /// Target phase of a planned but not yet applied transition.
    pub pending: Option<TheaterPhase>,
}

/// `idle → intro → playing ⇄ paused → ended → playing`.
///
/// Transitions that need asynchronous work (loading) go through [`plan`](Self::plan) /
/// [`apply`](Self::apply) so a second attempt while the first is in flight fails fast.
#[derive(Debug, Clone)]
pub struct TheaterStateMachine {
    phase: TheaterPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for TheaterStateMachine {
    fn default() -> Self {
        Self {
            phase: TheaterPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl TheaterStateMachine {
    /// Machine in `idle` with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> TheaterPhase {
        self.phase
    }

    /// Plan waiting for [`apply`](Self::apply) or [`abort`](Self::abort).
    pub fn pending(&self) -> Option<&Plan> {
        self.pending.as_ref()
    }

    /// Phase, version and pending target in one value.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate `event` against the current phase and reserve the transition.
    pub fn plan(&mut self, event: TheaterEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition and return the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<TheaterPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        Ok(self.phase)
    }

    /// Drop a planned transition, leaving the phase untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Plan and apply in one step, for transitions without side work.
    pub fn fire(&mut self, event: TheaterEvent) -> Result<TheaterPhase, PlanError> {
        let plan = self.plan(event)?;
        // Nothing can run between plan and apply here.
        Ok(self.apply(plan.id).unwrap_or(plan.to))
    }

    fn compute_transition(&self, event: TheaterEvent) -> Result<TheaterPhase, InvalidTransition> {
        use TheaterEvent as E;
        use TheaterPhase as P;

        let next = match (self.phase, event) {
            (P::Idle, E::Loaded) => P::Intro,
            (P::Intro | P::Paused, E::Play) => P::Playing,
            (P::Playing, E::Pause) => P::Paused,
            (P::Playing | P::Paused, E::Ended) => P::Ended,
            (P::Ended, E::Replay) => P::Playing,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut TheaterStateMachine, event: TheaterEvent) -> TheaterPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = TheaterStateMachine::new();
        assert_eq!(sm.phase(), TheaterPhase::Idle);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn full_viewing_path() {
        let mut sm = TheaterStateMachine::new();

        assert_eq!(apply(&mut sm, TheaterEvent::Loaded), TheaterPhase::Intro);
        assert_eq!(apply(&mut sm, TheaterEvent::Play), TheaterPhase::Playing);
        assert_eq!(apply(&mut sm, TheaterEvent::Pause), TheaterPhase::Paused);
        assert_eq!(apply(&mut sm, TheaterEvent::Play), TheaterPhase::Playing);
        assert_eq!(apply(&mut sm, TheaterEvent::Ended), TheaterPhase::Ended);
        assert_eq!(apply(&mut sm, TheaterEvent::Replay), TheaterPhase::Playing);
        assert_eq!(sm.snapshot().version, 6);
    }

    #[test]
    fn paused_stream_can_end() {
        let mut sm = TheaterStateMachine::new();
        apply(&mut sm, TheaterEvent::Loaded);
        apply(&mut sm, TheaterEvent::Play);
        apply(&mut sm, TheaterEvent::Pause);
        assert_eq!(sm.fire(TheaterEvent::Ended), Ok(TheaterPhase::Ended));
    }

    #[test]
    fn second_load_while_pending_fails() {
        let mut sm = TheaterStateMachine::new();
        let plan = sm.plan(TheaterEvent::Loaded).unwrap();
        assert_eq!(sm.snapshot().pending, Some(TheaterPhase::Intro));

        assert_eq!(sm.plan(TheaterEvent::Loaded).unwrap_err(), PlanError::AlreadyPending);

        sm.apply(plan.id).unwrap();
        assert!(matches!(
            sm.plan(TheaterEvent::Loaded),
            Err(PlanError::InvalidTransition(InvalidTransition {
                from: TheaterPhase::Intro,
                event: TheaterEvent::Loaded,
            }))
        ));
    }

    #[test]
    fn duplicate_play_is_invalid() {
        let mut sm = TheaterStateMachine::new();
        apply(&mut sm, TheaterEvent::Loaded);
        apply(&mut sm, TheaterEvent::Play);

        let err = sm.fire(TheaterEvent::Play).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, TheaterPhase::Playing);
                assert_eq!(invalid.event, TheaterEvent::Play);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sm.pending().is_none());
    }

    #[test]
    fn replay_only_from_ended() {
        let mut sm = TheaterStateMachine::new();
        apply(&mut sm, TheaterEvent::Loaded);
        assert!(sm.fire(TheaterEvent::Replay).is_err());
    }

    #[test]
    fn abort_clears_pending() {
        let mut sm = TheaterStateMachine::new();
        let plan = sm.plan(TheaterEvent::Loaded).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), TheaterPhase::Idle);
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan() {
        let mut sm = TheaterStateMachine::new();
        let plan = sm.plan(TheaterEvent::Loaded).unwrap();

        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { expected, .. } if expected == plan.id));
        assert_eq!(sm.apply(plan.id), Ok(TheaterPhase::Intro));
    }
}
