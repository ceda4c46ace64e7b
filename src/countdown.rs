//! Countdown-to-live computation and the one-shot "became live" edge.

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

const MS_PER_SECOND: i128 = 1_000;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

/// Time left before a premiere starts, decomposed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TimeRemaining {
    pub days: u64,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub is_live: bool,
}

impl TimeRemaining {
    /// Value reported once the target has been reached.
    pub const LIVE: Self = Self {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        is_live: true,
    };

    /// Whole seconds represented by the four fields.
    pub fn total_seconds(&self) -> u64 {
        self.days * SECONDS_PER_DAY
            + u64::from(self.hours) * SECONDS_PER_HOUR
            + u64::from(self.minutes) * SECONDS_PER_MINUTE
            + u64::from(self.seconds)
    }

    /// Render as `HH:MM:SS`, with a leading `DD:` only when at least one day remains.
    pub fn clock_face(&self) -> String {
        if self.days > 0 {
            format!(
                "{:02}:{:02}:{:02}:{:02}",
                self.days, self.hours, self.minutes, self.seconds
            )
        } else {
            format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        }
    }
}

/// Compute the time remaining until `target` as seen at `now`.
///
/// Fields are floored from the millisecond difference, so a target 999 ms away reports all
/// zeros while still not live.
pub fn compute(target: OffsetDateTime, now: OffsetDateTime) -> TimeRemaining {
    let delta_ms = (target - now).whole_milliseconds();
    if delta_ms <= 0 {
        return TimeRemaining::LIVE;
    }

    let total = u64::try_from(delta_ms / MS_PER_SECOND).unwrap_or(u64::MAX);
    TimeRemaining {
        days: total / SECONDS_PER_DAY,
        hours: ((total / SECONDS_PER_HOUR) % 24) as u8,
        minutes: ((total / SECONDS_PER_MINUTE) % 60) as u8,
        seconds: (total % 60) as u8,
        is_live: false,
    }
}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub remaining: TimeRemaining,
    /// True on exactly one tick per target: the first one observing the live state.
    pub became_live: bool,
}

/// Edge detector wrapped around [`compute`].
///
/// A tracker whose very first observation is already live still reports the edge, so a viewer
/// arriving after the start is let through like one who waited.
#[derive(Debug, Clone)]
pub struct CountdownTracker {
    target: OffsetDateTime,
    announced: bool,
}

impl CountdownTracker {
    /// Start tracking `target`.
    pub fn new(target: OffsetDateTime) -> Self {
        Self {
            target,
            announced: false,
        }
    }

    /// Instant being counted down to.
    pub fn target(&self) -> OffsetDateTime {
        self.target
    }

    /// Whether the live edge has already been reported.
    pub fn has_gone_live(&self) -> bool {
        self.announced
    }

    /// Point the tracker at a new target; the edge is re-armed only when the target changes.
    pub fn retarget(&mut self, target: OffsetDateTime) {
        if target != self.target {
            self.target = target;
            self.announced = false;
        }
    }

    /// Recompute the remaining time and report whether this tick crossed into live.
    pub fn tick(&mut self, now: OffsetDateTime) -> CountdownTick {
        let remaining = compute(self.target, now);
        let became_live = remaining.is_live && !self.announced;
        if became_live {
            self.announced = true;
        }
        CountdownTick {
            remaining,
            became_live,
        }
    }
}
