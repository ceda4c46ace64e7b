//! Keeps the ambient background player within a bounded drift of the main player.

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use super::{PlayerError, VideoPlayer};

/// Default accepted drift between the two players.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(750);
/// Smallest accepted tolerance.
pub const MIN_TOLERANCE: Duration = Duration::from_millis(500);
/// Largest accepted tolerance.
pub const MAX_TOLERANCE: Duration = Duration::from_millis(1_000);

/// Outcome of a reconciliation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Drift within tolerance; nothing was done.
    InSync { drift: Duration },
    /// Ambient was asked to jump to the main position.
    Corrected { drift: Duration },
}

/// Mirrors play/pause of `main` onto `ambient` and snaps ambient back when it drifts.
///
/// Ambient failures never propagate: the background layer is cosmetic.
pub struct DualPlayerSync {
    main: Arc<dyn VideoPlayer>,
    ambient: Arc<dyn VideoPlayer>,
    tolerance: Duration,
}

impl DualPlayerSync {
    /// Pair the two players; `tolerance` is clamped to 0.5–1.0 s.
    pub fn new(main: Arc<dyn VideoPlayer>, ambient: Arc<dyn VideoPlayer>, tolerance: Duration) -> Self {
        Self {
            main,
            ambient,
            tolerance: tolerance.clamp(MIN_TOLERANCE, MAX_TOLERANCE),
        }
    }

    pub fn main(&self) -> &Arc<dyn VideoPlayer> {
        &self.main
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Absolute position difference between the two players.
    pub fn drift(&self) -> Duration {
        self.main.position().abs_diff(self.ambient.position())
    }

    /// Main started playing: correct ambient if needed, then play it.
    pub async fn on_main_play(&self) {
        self.correct_if_drifted().await;
        let result = self.ambient.play().await;
        swallow("play", result);
    }

    /// Main paused: pause ambient where it is.
    pub async fn on_main_pause(&self) {
        let result = self.ambient.pause().await;
        swallow("pause", result);
    }

    /// Main reached the end: stop the ambient layer.
    pub async fn on_main_ended(&self) {
        let result = self.ambient.pause().await;
        swallow("pause", result);
    }

    /// Periodic drift check while main plays.
    pub async fn reconcile(&self) -> Reconciliation {
        self.correct_if_drifted().await
    }

    async fn correct_if_drifted(&self) -> Reconciliation {
        let drift = self.drift();
        if drift <= self.tolerance {
            return Reconciliation::InSync { drift };
        }

        debug!(drift_ms = drift.as_millis() as u64, "ambient drifted; seeking to main");
        let result = self.ambient.seek(self.main.position()).await;
        swallow("seek", result);
        Reconciliation::Corrected { drift }
    }
}

fn swallow(command: &'static str, result: Result<(), PlayerError>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_policy() => {
            debug!(command, error = %err, "ambient command rejected by policy")
        }
        Err(err) => warn!(command, error = %err, "ambient command failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{MemoryPlayer, PlayerCommand};

    fn pair(main_at: Duration, ambient_at: Duration) -> (Arc<MemoryPlayer>, Arc<MemoryPlayer>, DualPlayerSync) {
        let main = Arc::new(MemoryPlayer::at(main_at));
        let ambient = Arc::new(MemoryPlayer::at(ambient_at));
        let sync = DualPlayerSync::new(main.clone(), ambient.clone(), DEFAULT_TOLERANCE);
        (main, ambient, sync)
    }

    #[tokio::test]
    async fn play_corrects_large_drift_before_playing() {
        let (_main, ambient, sync) = pair(Duration::from_secs(10), Duration::ZERO);

        sync.on_main_play().await;

        assert_eq!(
            ambient.commands(),
            [PlayerCommand::Seek(Duration::from_secs(10)), PlayerCommand::Play]
        );
        assert!(sync.drift() <= sync.tolerance());
    }

    #[tokio::test]
    async fn small_drift_is_left_alone() {
        let (_main, ambient, sync) = pair(Duration::from_millis(5_300), Duration::from_secs(5));

        assert_eq!(
            sync.reconcile().await,
            Reconciliation::InSync {
                drift: Duration::from_millis(300)
            }
        );
        sync.on_main_play().await;
        assert_eq!(ambient.commands(), [PlayerCommand::Play]);
    }

    #[tokio::test]
    async fn reconcile_snaps_back_large_drift() {
        let (main, ambient, sync) = pair(Duration::from_secs(20), Duration::from_secs(20));
        main.set_position(Duration::from_millis(21_200));

        assert_eq!(
            sync.reconcile().await,
            Reconciliation::Corrected {
                drift: Duration::from_millis(1_200)
            }
        );
        assert_eq!(ambient.position(), Duration::from_millis(21_200));
    }

    #[tokio::test]
    async fn drift_exactly_at_tolerance_is_in_sync() {
        let (_main, ambient, sync) = pair(Duration::from_millis(750), Duration::ZERO);
        assert!(matches!(sync.reconcile().await, Reconciliation::InSync { .. }));
        assert!(ambient.commands().is_empty());
    }

    #[tokio::test]
    async fn pause_and_end_only_pause_ambient() {
        let (_main, ambient, sync) = pair(Duration::from_secs(30), Duration::ZERO);
        sync.on_main_pause().await;
        sync.on_main_ended().await;
        assert_eq!(ambient.commands(), [PlayerCommand::Pause, PlayerCommand::Pause]);
        assert_eq!(ambient.position(), Duration::ZERO);
    }

    #[tokio::test]
    async fn ambient_failures_never_reach_main() {
        let (main, ambient, sync) = pair(Duration::from_secs(10), Duration::ZERO);
        ambient.fail_with(Some(PlayerError::PolicyRejected("autoplay blocked".into())));

        sync.on_main_play().await;
        sync.on_main_pause().await;

        assert!(main.commands().is_empty());
        assert!(!ambient.is_playing());
    }

    #[test]
    fn tolerance_is_clamped() {
        let main = Arc::new(MemoryPlayer::new());
        let ambient = Arc::new(MemoryPlayer::new());
        let sync = DualPlayerSync::new(main, ambient, Duration::from_secs(5));
        assert_eq!(sync.tolerance(), MAX_TOLERANCE);
    }
}
