use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use serde_json::Value;
use tokio::{
    task::{JoinError, JoinSet},
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    access::{AccessGate, GateState, SubmitStep, register_attendee},
    config::TheaterSettings,
    countdown::{CountdownTracker, TimeRemaining},
    dao::{
        models::{AccessRecord, Premiere},
        storage::{StorageError, StorageResult},
    },
    player::{DualPlayerSync, PlayerEvent},
    presence::{self, PresenceCounter},
    reactions::{ReactionBus, reactions_topic},
    realtime::{Channel, JoinOptions, PresenceState, RealtimeResult},
};

use super::{
    TheaterDeps, TheaterError,
    state_machine::{PlanError, PlanId, TheaterEvent, TheaterPhase, TheaterStateMachine},
    view::{NOT_FOUND_MESSAGE, Stage, TheaterView},
};

/// Result of background work, fed back into the event loop.
pub(super) enum Completion {
    PremiereLoaded(Result<Option<Premiere>, TheaterError>),
    PresenceJoined(Option<Arc<dyn Channel>>),
    TokenFetched {
        plan_id: PlanId,
        result: Result<Option<String>, TheaterError>,
    },
    Registered(StorageResult<AccessRecord>),
    ReactionsJoined(RealtimeResult<Arc<dyn Channel>>),
}

/// Input produced by the controller's own feeds.
pub(super) enum Signal {
    Reaction(Option<Value>),
    Presence(Option<PresenceState>),
    Completed(Result<Completion, JoinError>),
}

async fn next_item<T>(stream: Option<&mut BoxStream<'static, T>>) -> Option<T> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn leave_channel(channel: Arc<dyn Channel>) {
    if let Err(err) = channel.leave().await {
        debug!(topic = channel.topic(), error = %err, "failed to leave channel");
    }
}

async fn bounded<T, E>(
    limit: Duration,
    work: impl Future<Output = Result<T, E>>,
) -> Result<T, TheaterError>
where
    TheaterError: From<E>,
{
    match timeout(limit, work).await {
        Ok(result) => result.map_err(TheaterError::from),
        Err(_) => Err(TheaterError::Timeout(limit)),
    }
}

/// State of one viewing session.
///
/// Owned by a single task; every method runs to completion before the next event is handled,
/// and slow work runs in tasks whose results come back as [`Completion`]s.
pub struct TheaterController {
    premiere_id: String,
    deps: TheaterDeps,
    settings: TheaterSettings,
    opened: bool,
    stage: Stage,
    premiere: Option<Premiere>,
    countdown: Option<CountdownTracker>,
    remaining: Option<TimeRemaining>,
    gate: Option<AccessGate>,
    machine: TheaterStateMachine,
    playback_token: Option<String>,
    sync: DualPlayerSync,
    reactions: ReactionBus,
    reactions_joining: bool,
    presence: PresenceCounter,
    tasks: JoinSet<Completion>,
    controls_visible: bool,
    controls_deadline: Option<Instant>,
}

impl TheaterController {
    /// Session for `premiere_id`; nothing runs until [`open`](Self::open).
    pub fn new(premiere_id: impl Into<String>, deps: TheaterDeps, settings: TheaterSettings) -> Self {
        let sync = DualPlayerSync::new(
            deps.main.clone(),
            deps.ambient.clone(),
            settings.drift_tolerance,
        );
        let reactions = ReactionBus::new(settings.reactions.clone());
        Self {
            premiere_id: premiere_id.into(),
            deps,
            settings,
            opened: false,
            stage: Stage::Loading,
            premiere: None,
            countdown: None,
            remaining: None,
            gate: None,
            machine: TheaterStateMachine::new(),
            playback_token: None,
            sync,
            reactions,
            reactions_joining: false,
            presence: PresenceCounter::new(),
            tasks: JoinSet::new(),
            controls_visible: true,
            controls_deadline: None,
        }
    }

    /// Settings the session was created with.
    pub fn settings(&self) -> &TheaterSettings {
        &self.settings
    }

    /// Current playback phase.
    pub fn phase(&self) -> TheaterPhase {
        self.machine.phase()
    }

    /// Instant at which the controls should hide, if playing.
    pub fn controls_deadline(&self) -> Option<Instant> {
        self.controls_deadline
    }

    /// Start fetching the premiere.
    pub fn open(&mut self) {
        if self.opened {
            return;
        }
        self.opened = true;

        let store = self.deps.store.clone();
        let premiere_id = self.premiere_id.clone();
        let limit = self.settings.load_timeout;
        self.tasks.spawn(async move {
            let result = bounded(limit, store.premiere_by_id(&premiere_id)).await;
            Completion::PremiereLoaded(result)
        });
    }

    /// Countdown tick; the live edge is an entry attempt.
    pub fn tick(&mut self) {
        let Some(tracker) = self.countdown.as_mut() else {
            return;
        };
        let tick = tracker.tick(self.deps.clock.now());
        self.remaining = Some(tick.remaining);
        if tick.became_live {
            info!(premiere_id = %self.premiere_id, "premiere is live");
            self.try_enter("countdown");
        }
    }

    /// Viewer pressed "enter".
    pub fn enter(&mut self) {
        self.try_enter("viewer");
    }

    /// Viewer submitted the email form.
    pub fn submit(&mut self, email: &str) {
        let Some(gate) = self.gate.as_mut() else {
            debug!(premiere_id = %self.premiere_id, "email submitted before premiere loaded");
            return;
        };

        match gate.begin_submit(email) {
            SubmitStep::Ignored => {}
            SubmitStep::Rejected(reason) => {
                debug!(premiere_id = %self.premiere_id, reason = reason.as_str(), "email rejected")
            }
            SubmitStep::Register(registration) => {
                let store = gate.store();
                let limit = self.settings.load_timeout;
                self.tasks.spawn(async move {
                    let registering = register_attendee(
                        store.as_ref(),
                        &registration.premiere_id,
                        &registration.email,
                    );
                    let outcome = match timeout(limit, registering).await {
                        Ok(outcome) => outcome,
                        Err(elapsed) => Err(StorageError::unavailable(
                            "attendee registration timed out".into(),
                            elapsed,
                        )),
                    };
                    Completion::Registered(outcome)
                });
            }
        }
    }

    /// Viewer pressed "start" in the intro or while paused.
    pub async fn start(&mut self) {
        if !matches!(self.phase(), TheaterPhase::Intro | TheaterPhase::Paused) {
            debug!(phase = ?self.phase(), "start ignored");
            return;
        }
        if let Err(err) = self.deps.main.play().await {
            warn!(error = %err, "main player refused to start");
            return;
        }
        self.transition(TheaterEvent::Play).await;
    }

    /// Viewer asked to watch again after the end.
    pub async fn replay(&mut self) {
        if self.phase() != TheaterPhase::Ended {
            debug!(phase = ?self.phase(), "replay ignored");
            return;
        }
        if let Err(err) = self.deps.main.seek(Duration::ZERO).await {
            warn!(error = %err, "main player refused to rewind");
        }
        if let Err(err) = self.deps.main.play().await {
            warn!(error = %err, "main player refused to replay");
            return;
        }
        self.transition(TheaterEvent::Replay).await;
    }

    /// Event reported by the main player.
    pub async fn player_event(&mut self, event: PlayerEvent) {
        let event = match event {
            PlayerEvent::Play => TheaterEvent::Play,
            PlayerEvent::Pause => TheaterEvent::Pause,
            PlayerEvent::Ended => TheaterEvent::Ended,
        };
        self.transition(event).await;
    }

    /// Send a reaction while playing.
    pub fn react(&mut self, emoji: &str) {
        if !self.phase().is_playing() {
            debug!(phase = ?self.phase(), "reaction ignored outside playback");
            return;
        }
        self.reactions.send(emoji, self.deps.clock.now());
    }

    /// Pointer moved: show controls and restart the idle delay while playing.
    pub fn pointer_activity(&mut self) {
        self.controls_visible = true;
        if self.phase().is_playing() {
            self.controls_deadline = Some(Instant::now() + self.settings.controls_idle);
        }
    }

    /// Hide the controls once the idle deadline has passed.
    pub fn hide_idle_controls(&mut self) {
        match self.controls_deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.controls_deadline = None;
                if self.phase().is_playing() {
                    self.controls_visible = false;
                }
            }
            _ => {}
        }
    }

    /// Expire old reactions.
    pub fn sweep(&mut self) {
        self.reactions.sweep(self.deps.clock.now());
    }

    /// Periodic ambient drift check.
    pub async fn reconcile(&mut self) {
        if self.phase().is_playing() {
            self.sync.reconcile().await;
        }
    }

    /// Wait for the next reaction, presence snapshot or finished task.
    pub(super) async fn next_signal(&mut self) -> Signal {
        tokio::select! {
            item = next_item(self.reactions.incoming()) => Signal::Reaction(item),
            item = next_item(self.presence.syncs()) => Signal::Presence(item),
            Some(done) = self.tasks.join_next() => Signal::Completed(done),
        }
    }

    pub(super) async fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Reaction(Some(payload)) => {
                if self.phase().is_playing() {
                    self.reactions.receive(payload, self.deps.clock.now());
                }
            }
            Signal::Reaction(None) => self.reactions.incoming_closed(),
            Signal::Presence(Some(state)) => {
                self.presence.on_sync(&state);
            }
            Signal::Presence(None) => self.presence.syncs_closed(),
            Signal::Completed(Ok(completion)) => self.on_completion(completion).await,
            Signal::Completed(Err(err)) => self.on_task_failure(err),
        }
    }

    async fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::PremiereLoaded(result) => self.on_premiere_loaded(result),
            Completion::PresenceJoined(Some(channel)) => self.presence.attach(channel),
            Completion::PresenceJoined(None) => {}
            Completion::TokenFetched { plan_id, result } => self.on_token_fetched(plan_id, result),
            Completion::Registered(outcome) => self.on_registered(outcome),
            Completion::ReactionsJoined(result) => self.on_reactions_joined(result).await,
        }
    }

    fn on_task_failure(&mut self, err: JoinError) {
        if err.is_cancelled() {
            return;
        }
        warn!(premiere_id = %self.premiere_id, error = %err, "theater task failed");
        if let Some(plan_id) = self.machine.pending().map(|plan| plan.id) {
            let _ = self.machine.abort(plan_id);
        }
    }

    fn on_premiere_loaded(&mut self, result: Result<Option<Premiere>, TheaterError>) {
        let premiere = match result {
            Ok(Some(premiere)) => premiere,
            Ok(None) => {
                warn!(premiere_id = %self.premiere_id, "premiere not found");
                self.fail(NOT_FOUND_MESSAGE);
                return;
            }
            Err(err) => {
                warn!(premiere_id = %self.premiere_id, error = %err, "failed to load premiere");
                self.fail(NOT_FOUND_MESSAGE);
                return;
            }
        };

        info!(premiere_id = %self.premiere_id, title = %premiere.title, "premiere loaded");
        self.countdown = Some(CountdownTracker::new(premiere.scheduled_at));
        self.gate = Some(AccessGate::restore(
            premiere.id.clone(),
            self.deps.store.clone(),
            self.deps.cache.clone(),
        ));
        self.premiere = Some(premiere);
        self.stage = Stage::Lobby;

        self.join_presence();
        self.tick();
    }

    fn fail(&mut self, message: &str) {
        self.stage = Stage::NotFound {
            message: message.to_string(),
        };
    }

    fn join_presence(&mut self) {
        let online_at = presence::online_at(self.deps.clock.as_ref());
        let connecting =
            self.presence
                .connect(self.deps.realtime.as_ref(), &self.premiere_id, online_at);
        self.tasks
            .spawn(async move { Completion::PresenceJoined(connecting.await) });
    }

    /// Move into the theater once access is granted and the premiere is live.
    fn try_enter(&mut self, trigger: &'static str) {
        if self.stage != Stage::Lobby {
            return;
        }

        let granted = self.gate.as_ref().is_some_and(AccessGate::is_granted);
        let live = self
            .countdown
            .as_ref()
            .is_some_and(CountdownTracker::has_gone_live);
        if !(granted && live) {
            debug!(trigger, granted, live, "entry not allowed yet");
            return;
        }

        let Some(playback_id) = self.premiere.as_ref().map(|p| p.playback_id.clone()) else {
            return;
        };

        let plan = match self.machine.plan(TheaterEvent::Loaded) {
            Ok(plan) => plan,
            Err(PlanError::AlreadyPending) => {
                debug!(trigger, "entry already in progress");
                return;
            }
            Err(err) => {
                debug!(trigger, error = %err, "entry ignored");
                return;
            }
        };

        debug!(trigger, plan_id = %plan.id, "entering theater");
        let tokens = self.deps.tokens.clone();
        let limit = self.settings.load_timeout;
        self.tasks.spawn(async move {
            let result = bounded(limit, tokens.request_playback_token(&playback_id)).await;
            Completion::TokenFetched {
                plan_id: plan.id,
                result,
            }
        });
    }

    fn on_token_fetched(&mut self, plan_id: PlanId, result: Result<Option<String>, TheaterError>) {
        let token = result.unwrap_or_else(|err| {
            warn!(premiere_id = %self.premiere_id, error = %err, "playback token unavailable; playing unsigned");
            None
        });

        match self.machine.apply(plan_id) {
            Ok(phase) => {
                self.playback_token = token;
                self.stage = Stage::Theater;
                info!(
                    premiere_id = %self.premiere_id,
                    phase = ?phase,
                    signed = self.playback_token.is_some(),
                    "entered theater"
                );
            }
            Err(err) => warn!(premiere_id = %self.premiere_id, error = %err, "dropping stale entry"),
        }
    }

    fn on_registered(&mut self, outcome: StorageResult<AccessRecord>) {
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        let granted = matches!(gate.complete(outcome), GateState::Granted { .. });
        if granted {
            self.try_enter("access-granted");
        }
    }

    async fn transition(&mut self, event: TheaterEvent) {
        let before = self.machine.phase();
        match self.machine.fire(event) {
            Ok(after) => {
                debug!(from = ?before, to = ?after, "theater transition");
                self.on_phase_change(before, after).await;
            }
            Err(err) => debug!(error = %err, "ignoring theater event"),
        }
    }

    async fn on_phase_change(&mut self, before: TheaterPhase, after: TheaterPhase) {
        match (before.is_playing(), after) {
            (false, TheaterPhase::Playing) => {
                self.sync.on_main_play().await;
                self.attach_reactions();
                self.controls_visible = true;
                self.controls_deadline = Some(Instant::now() + self.settings.controls_idle);
            }
            (true, TheaterPhase::Paused) => {
                self.sync.on_main_pause().await;
                self.leave_playing().await;
            }
            (true, TheaterPhase::Ended) => {
                self.sync.on_main_ended().await;
                self.leave_playing().await;
            }
            (false, TheaterPhase::Ended) => self.sync.on_main_ended().await,
            _ => {}
        }
    }

    async fn leave_playing(&mut self) {
        self.reactions.detach().await;
        self.controls_visible = true;
        self.controls_deadline = None;
    }

    fn attach_reactions(&mut self) {
        if self.reactions.is_attached() || self.reactions_joining {
            return;
        }
        self.reactions_joining = true;

        let options = JoinOptions::broadcast(self.reactions.settings().self_echo);
        let joining = self
            .deps
            .realtime
            .join(&reactions_topic(&self.premiere_id), options);
        self.tasks
            .spawn(async move { Completion::ReactionsJoined(joining.await) });
    }

    async fn on_reactions_joined(&mut self, result: RealtimeResult<Arc<dyn Channel>>) {
        self.reactions_joining = false;
        match result {
            Ok(channel) if self.phase().is_playing() => self.reactions.attach(channel).await,
            Ok(channel) => leave_channel(channel).await,
            Err(err) => warn!(premiere_id = %self.premiere_id, error = %err, "reactions unavailable"),
        }
    }

    /// Snapshot for renderers.
    pub fn view(&self) -> TheaterView {
        let phase = self.phase();
        let gate = self.gate.as_ref().map(|gate| gate.state().clone());
        let gate_message = match &gate {
            Some(GateState::Denied { reason }) => Some(reason.message()),
            _ => None,
        };

        TheaterView {
            stage: self.stage.clone(),
            phase,
            premiere: self.premiere.clone(),
            countdown: self.remaining,
            gate,
            gate_message,
            playback_token: self.playback_token.clone(),
            viewers: self.presence.count(),
            reactions: if phase.is_playing() {
                self.reactions.visible().cloned().collect()
            } else {
                Vec::new()
            },
            controls_visible: self.controls_visible,
        }
    }

    /// Cancel background work and leave every channel.
    pub async fn teardown(&mut self) {
        self.tasks.abort_all();
        while let Some(done) = self.tasks.join_next().await {
            // Joins that finished before the abort still hold a subscription.
            if let Ok(
                Completion::PresenceJoined(Some(channel))
                | Completion::ReactionsJoined(Ok(channel)),
            ) = done
            {
                leave_channel(channel).await;
            }
        }
        self.reactions_joining = false;

        if let Some(plan_id) = self.machine.pending().map(|plan| plan.id) {
            let _ = self.machine.abort(plan_id);
        }
        self.reactions.detach().await;
        self.presence.leave().await;
        self.controls_deadline = None;
        info!(premiere_id = %self.premiere_id, "theater session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use serde_json::Value;
    use time::macros::datetime;
    use tokio::task::yield_now;

    use super::*;
    use crate::{
        access::{AccessCache, MemoryAccessCache},
        clock::ManualClock,
        dao::premiere_store::memory::MemoryPremiereStore,
        player::MemoryPlayer,
        realtime::{LocalHub, Realtime},
        token::TokenIssuer,
    };

    const STARTS_AT: time::OffsetDateTime = datetime!(2026-11-01 20:00 UTC);

    /// Hub wrapper counting explicit `leave` calls, which `LocalChannel`'s drop does not make.
    #[derive(Default)]
    struct CountingRealtime {
        hub: LocalHub,
        joins: AtomicUsize,
        leaves: Arc<AtomicUsize>,
    }

    struct CountedChannel {
        inner: Arc<dyn Channel>,
        leaves: Arc<AtomicUsize>,
    }

    impl Realtime for CountingRealtime {
        fn join(
            &self,
            topic: &str,
            options: JoinOptions,
        ) -> BoxFuture<'static, RealtimeResult<Arc<dyn Channel>>> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            let leaves = self.leaves.clone();
            let joining = self.hub.join(topic, options);
            Box::pin(async move {
                let inner = joining.await?;
                Ok(Arc::new(CountedChannel { inner, leaves }) as Arc<dyn Channel>)
            })
        }
    }

    impl Channel for CountedChannel {
        fn topic(&self) -> &str {
            self.inner.topic()
        }

        fn presence_key(&self) -> &str {
            self.inner.presence_key()
        }

        fn broadcast(&self, event: &str, payload: Value) -> BoxFuture<'static, RealtimeResult<()>> {
            self.inner.broadcast(event, payload)
        }

        fn on_broadcast(&self, event: &str) -> BoxStream<'static, Value> {
            self.inner.on_broadcast(event)
        }

        fn track_presence(&self, meta: Value) -> BoxFuture<'static, RealtimeResult<()>> {
            self.inner.track_presence(meta)
        }

        fn on_presence_sync(&self) -> BoxStream<'static, PresenceState> {
            self.inner.on_presence_sync()
        }

        fn leave(&self) -> BoxFuture<'static, RealtimeResult<()>> {
            self.leaves.fetch_add(1, Ordering::SeqCst);
            self.inner.leave()
        }
    }

    fn controller(realtime: Arc<CountingRealtime>, cache: Arc<MemoryAccessCache>) -> TheaterController {
        let store = MemoryPremiereStore::with_premieres([Premiere {
            id: "launch".into(),
            title: "Launch night".into(),
            description: None,
            playback_id: "pb-launch".into(),
            asset_id: None,
            thumbnail_url: None,
            scheduled_at: STARTS_AT,
            is_live: false,
            created_at: None,
        }]);
        let deps = TheaterDeps {
            store: Arc::new(store),
            realtime,
            tokens: Arc::new(TokenIssuer::unsigned()),
            cache,
            clock: Arc::new(ManualClock::new(STARTS_AT)),
            main: Arc::new(MemoryPlayer::new()),
            ambient: Arc::new(MemoryPlayer::new()),
        };
        TheaterController::new("launch", deps, TheaterSettings::default())
    }

    async fn handle_until(controller: &mut TheaterController, stage: Stage) {
        timeout(Duration::from_secs(1), async {
            while controller.view().stage != stage {
                let signal = controller.next_signal().await;
                controller.on_signal(signal).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {stage:?}"));
    }

    /// Let spawned join tasks run to completion without handling their results.
    async fn settle_tasks() {
        for _ in 0..5 {
            yield_now().await;
        }
    }

    #[tokio::test]
    async fn teardown_leaves_a_lobby_joined_but_not_yet_handled() {
        let realtime = Arc::new(CountingRealtime::default());
        let mut controller = controller(realtime.clone(), Arc::new(MemoryAccessCache::new()));

        controller.open();
        handle_until(&mut controller, Stage::Lobby).await;
        settle_tasks().await;
        assert!(!controller.presence.is_joined());

        controller.teardown().await;
        assert_eq!(realtime.joins.load(Ordering::SeqCst), 1);
        assert_eq!(realtime.leaves.load(Ordering::SeqCst), 1);
        assert_eq!(realtime.hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn teardown_leaves_reactions_joined_but_not_yet_handled() {
        let realtime = Arc::new(CountingRealtime::default());
        let cache = Arc::new(MemoryAccessCache::new());
        cache.store("launch", "fan@example.com").unwrap();
        let mut controller = controller(realtime.clone(), cache);

        controller.open();
        handle_until(&mut controller, Stage::Theater).await;
        controller.start().await;
        assert_eq!(controller.phase(), TheaterPhase::Playing);
        settle_tasks().await;
        assert!(!controller.reactions.is_attached());

        controller.teardown().await;
        assert_eq!(realtime.joins.load(Ordering::SeqCst), 2);
        assert_eq!(realtime.leaves.load(Ordering::SeqCst), 2);
    }
}
