//! Live count of viewers connected to a premiere's lobby.

use std::sync::Arc;

use futures::{future::BoxFuture, stream::BoxStream};
use rand::{Rng, distr::Alphanumeric};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::{
    clock::Clock,
    realtime::{Channel, JoinOptions, PresenceState, Realtime},
};

const KEY_LEN: usize = 7;

/// Presence topic of `premiere_id`.
pub fn lobby_topic(premiere_id: &str) -> String {
    format!("lobby:{premiere_id}")
}

/// RFC 3339 rendering of `clock.now()` used as presence metadata.
pub fn online_at(clock: &dyn Clock) -> String {
    clock.now().format(&Rfc3339).unwrap_or_default()
}

/// Random per-session presence key: seven lowercase base-36 characters.
pub fn presence_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .map(|byte| (byte as char).to_ascii_lowercase())
        .take(KEY_LEN)
        .collect()
}

/// Tracks this client in the lobby and reports how many distinct clients are there.
///
/// Every failure degrades to a count of one.
pub struct PresenceCounter {
    key: String,
    channel: Option<Arc<dyn Channel>>,
    syncs: Option<BoxStream<'static, PresenceState>>,
    count: usize,
}

impl Default for PresenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceCounter {
    /// Counter with a fresh random presence key.
    pub fn new() -> Self {
        Self::with_key(presence_key())
    }

    /// Counter tracked under `key`; the same key in two tabs counts once.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            channel: None,
            syncs: None,
            count: 1,
        }
    }

    /// Presence key of this client.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Viewers currently in the lobby, never less than one.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the lobby channel is held.
    pub fn is_joined(&self) -> bool {
        self.channel.is_some()
    }

    /// Join the lobby of `premiere_id` and announce this client.
    pub async fn join(&mut self, realtime: &dyn Realtime, premiere_id: &str, clock: &dyn Clock) {
        if self.channel.is_some() {
            return;
        }
        let online_at = online_at(clock);
        if let Some(channel) = self.connect(realtime, premiere_id, online_at).await {
            self.attach(channel);
        }
    }

    /// Join and track without touching `self`, so the work can run off the event loop.
    ///
    /// Returns `None` when the join failed; a failed track still yields the channel.
    pub fn connect(
        &self,
        realtime: &dyn Realtime,
        premiere_id: &str,
        online_at: String,
    ) -> BoxFuture<'static, Option<Arc<dyn Channel>>> {
        let topic = lobby_topic(premiere_id);
        let joining = realtime.join(&topic, JoinOptions::with_presence_key(self.key.clone()));
        Box::pin(async move {
            let channel = match joining.await {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(topic = %topic, error = %err, "presence join failed");
                    return None;
                }
            };
            if let Err(err) = channel.track_presence(json!({ "online_at": online_at })).await {
                warn!(topic = %topic, error = %err, "presence track failed");
            }
            Some(channel)
        })
    }

    /// Adopt a channel produced by [`connect`](Self::connect).
    pub fn attach(&mut self, channel: Arc<dyn Channel>) {
        debug!(topic = channel.topic(), key = %self.key, "presence joined");
        self.syncs = Some(channel.on_presence_sync());
        self.channel = Some(channel);
    }

    /// Presence snapshots while joined.
    pub fn syncs(&mut self) -> Option<&mut BoxStream<'static, PresenceState>> {
        self.syncs.as_mut()
    }

    /// Apply a presence snapshot.
    pub fn on_sync(&mut self, state: &PresenceState) -> usize {
        self.count = state.len().max(1);
        self.count
    }

    /// The sync stream ended: the transport went away.
    pub fn syncs_closed(&mut self) {
        self.syncs = None;
        self.count = 1;
    }

    /// Leave the lobby.
    pub async fn leave(&mut self) {
        self.syncs = None;
        self.count = 1;
        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.leave().await {
                debug!(topic = channel.topic(), error = %err, "presence leave failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use time::macros::datetime;

    use super::*;
    use crate::{
        clock::ManualClock,
        realtime::{LocalHub, RealtimeError, RealtimeResult},
    };

    struct Unreachable;

    impl Realtime for Unreachable {
        fn join(
            &self,
            topic: &str,
            _options: JoinOptions,
        ) -> BoxFuture<'static, RealtimeResult<Arc<dyn Channel>>> {
            let err = RealtimeError::Transport(format!("cannot reach {topic}"));
            Box::pin(async move { Err(err) })
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(datetime!(2025-06-14 20:55 UTC))
    }

    async fn settle(counter: &mut PresenceCounter) -> usize {
        let state = counter.syncs().unwrap().next().await.unwrap();
        counter.on_sync(&state)
    }

    #[test]
    fn keys_are_seven_lowercase_base36_chars() {
        for _ in 0..50 {
            let key = presence_key();
            assert_eq!(key.len(), 7);
            assert!(key.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        }
    }

    #[tokio::test]
    async fn two_clients_converge_to_two_and_back_to_one() {
        let hub = LocalHub::default();
        let clock = clock();
        let mut a = PresenceCounter::with_key("aaaaaaa");
        let mut b = PresenceCounter::with_key("bbbbbbb");

        a.join(&hub, "p1", &clock).await;
        b.join(&hub, "p1", &clock).await;

        // b joined after both tracks, so its first snapshot is already complete.
        assert_eq!(settle(&mut b).await, 2);
        while settle(&mut a).await != 2 {}

        b.leave().await;
        while settle(&mut a).await != 1 {}
        assert_eq!(b.count(), 1);
    }

    #[tokio::test]
    async fn empty_snapshot_still_counts_self() {
        let mut counter = PresenceCounter::new();
        assert_eq!(counter.on_sync(&PresenceState::new()), 1);
    }

    #[tokio::test]
    async fn join_failure_leaves_count_at_one() {
        let mut counter = PresenceCounter::new();
        counter.join(&Unreachable, "p1", &clock()).await;
        assert!(!counter.is_joined());
        assert!(counter.syncs().is_none());
        assert_eq!(counter.count(), 1);
    }
}
