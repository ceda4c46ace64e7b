use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::{
    StreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream, errors::BroadcastStreamRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Channel, JoinOptions, PresenceState, Realtime, RealtimeError, RealtimeResult};

const DEFAULT_TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Envelope {
    origin: Uuid,
    event: Arc<str>,
    payload: Value,
}

struct Member {
    key: String,
    metas: Vec<Value>,
}

/// Per-topic fan-out state.
struct Topic {
    sender: broadcast::Sender<Envelope>,
    presence: watch::Sender<PresenceState>,
    members: Mutex<IndexMap<Uuid, Member>>,
}

impl Topic {
    fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        let (presence, _receiver) = watch::channel(PresenceState::new());
        Self {
            sender,
            presence,
            members: Mutex::new(IndexMap::new()),
        }
    }

    fn update_member<F>(&self, id: Uuid, update: F)
    where
        F: FnOnce(&mut IndexMap<Uuid, Member>),
    {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut members);

        let mut state = PresenceState::new();
        for member in members.values().filter(|member| !member.metas.is_empty()) {
            state
                .entry(member.key.clone())
                .or_default()
                .extend(member.metas.iter().cloned());
        }
        drop(members);

        self.presence.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        debug!(member = %id, "presence updated");
    }

    fn is_idle(&self) -> bool {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// In-process [`Realtime`] transport; clones share the same topics.
#[derive(Clone)]
pub struct LocalHub {
    topics: Arc<DashMap<String, Arc<Topic>>>,
    capacity: usize,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LocalHub {
    /// Create a hub whose topics buffer up to `capacity` broadcasts per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with at least one joined channel.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Current presence snapshot of `topic`.
    pub fn presence(&self, topic: &str) -> PresenceState {
        self.topics
            .get(topic)
            .map(|entry| entry.presence.borrow().clone())
            .unwrap_or_default()
    }

    /// Join `topic` and return the concrete channel type.
    pub fn join_local(&self, topic: &str, options: JoinOptions) -> RealtimeResult<LocalChannel> {
        if topic.trim().is_empty() {
            return Err(RealtimeError::JoinRejected {
                topic: topic.to_string(),
                reason: "topic name is empty".into(),
            });
        }

        let member = Uuid::new_v4();
        let key = options
            .presence_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| member.simple().to_string());

        // Registering under the shard guard keeps a concurrent release from dropping the topic.
        let entry = {
            let guard = self
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Topic::new(self.capacity)));
            guard.update_member(member, |members| {
                members.insert(
                    member,
                    Member {
                        key: key.clone(),
                        metas: Vec::new(),
                    },
                );
            });
            Arc::clone(&guard)
        };

        let (closed, _receiver) = watch::channel(false);
        debug!(topic, key = %key, "channel joined");
        Ok(LocalChannel {
            hub: self.clone(),
            topic_name: topic.to_string(),
            topic: entry,
            member,
            key,
            self_echo: options.self_echo,
            left: AtomicBool::new(false),
            closed,
        })
    }

    fn release(&self, topic_name: &str, topic: &Topic, member: Uuid) {
        topic.update_member(member, |members| {
            members.shift_remove(&member);
        });
        self.topics
            .remove_if(topic_name, |_, existing| existing.is_idle());
    }
}

impl Realtime for LocalHub {
    fn join(
        &self,
        topic: &str,
        options: JoinOptions,
    ) -> BoxFuture<'static, RealtimeResult<Arc<dyn Channel>>> {
        let joined = self
            .join_local(topic, options)
            .map(|channel| Arc::new(channel) as Arc<dyn Channel>);
        Box::pin(future::ready(joined))
    }
}

/// Channel handed out by [`LocalHub`]; leaving or dropping it removes its presence.
pub struct LocalChannel {
    hub: LocalHub,
    topic_name: String,
    topic: Arc<Topic>,
    member: Uuid,
    key: String,
    self_echo: bool,
    left: AtomicBool,
    closed: watch::Sender<bool>,
}

impl LocalChannel {
    fn closed_error(&self) -> RealtimeError {
        RealtimeError::Closed {
            topic: self.topic_name.clone(),
        }
    }

    fn is_left(&self) -> bool {
        self.left.load(Ordering::Acquire)
    }

    /// Future resolving once this channel is left or dropped.
    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut receiver = self.closed.subscribe();
        Box::pin(async move {
            let _ = receiver.wait_for(|closed| *closed).await;
        })
    }

    /// Every broadcast delivered to this channel as `(event, payload)`.
    pub fn on_any_broadcast(&self) -> BoxStream<'static, (String, Value)> {
        self.envelopes()
            .map(|envelope| (envelope.event.to_string(), envelope.payload))
            .boxed()
    }

    fn envelopes(&self) -> BoxStream<'static, Envelope> {
        let me = self.member;
        let self_echo = self.self_echo;
        let topic = self.topic_name.clone();

        BroadcastStream::new(self.topic.sender.subscribe())
            .filter_map(move |item| {
                let envelope = match item {
                    Ok(envelope) => (self_echo || envelope.origin != me).then_some(envelope),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "subscriber lagged behind broadcasts");
                        None
                    }
                };
                future::ready(envelope)
            })
            .take_until(self.closed())
            .boxed()
    }

    fn release(&self) -> bool {
        if self.left.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed.send_replace(true);
        self.hub.release(&self.topic_name, &self.topic, self.member);
        true
    }
}

impl Channel for LocalChannel {
    fn topic(&self) -> &str {
        &self.topic_name
    }

    fn presence_key(&self) -> &str {
        &self.key
    }

    fn broadcast(&self, event: &str, payload: Value) -> BoxFuture<'static, RealtimeResult<()>> {
        if self.is_left() {
            return Box::pin(future::ready(Err(self.closed_error())));
        }

        // No subscribers is not a failure.
        let _ = self.topic.sender.send(Envelope {
            origin: self.member,
            event: Arc::from(event),
            payload,
        });
        Box::pin(future::ready(Ok(())))
    }

    fn on_broadcast(&self, event: &str) -> BoxStream<'static, Value> {
        let wanted: Arc<str> = Arc::from(event);
        self.envelopes()
            .filter_map(move |envelope| {
                future::ready((envelope.event == wanted).then_some(envelope.payload))
            })
            .boxed()
    }

    fn track_presence(&self, meta: Value) -> BoxFuture<'static, RealtimeResult<()>> {
        if self.is_left() {
            return Box::pin(future::ready(Err(self.closed_error())));
        }

        self.topic.update_member(self.member, |members| {
            if let Some(member) = members.get_mut(&self.member) {
                member.metas = vec![meta];
            }
        });
        Box::pin(future::ready(Ok(())))
    }

    fn on_presence_sync(&self) -> BoxStream<'static, PresenceState> {
        WatchStream::new(self.topic.presence.subscribe())
            .take_until(self.closed())
            .boxed()
    }

    fn leave(&self) -> BoxFuture<'static, RealtimeResult<()>> {
        if self.release() {
            debug!(topic = %self.topic_name, key = %self.key, "channel left");
        }
        Box::pin(future::ready(Ok(())))
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    use super::*;

    async fn next<T>(stream: &mut BoxStream<'static, T>) -> Option<T> {
        timeout(Duration::from_millis(200), stream.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn broadcasts_reach_other_subscribers_only_by_default() {
        let hub = LocalHub::default();
        let sender = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let receiver = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();

        let mut own = sender.on_broadcast("reaction");
        let mut other = receiver.on_broadcast("reaction");

        sender
            .broadcast("reaction", json!({"emoji": "🔥"}))
            .await
            .unwrap();

        assert_eq!(next(&mut other).await, Some(json!({"emoji": "🔥"})));
        assert_eq!(next(&mut own).await, None);
    }

    #[tokio::test]
    async fn self_echo_delivers_own_broadcasts() {
        let hub = LocalHub::default();
        let channel = hub.join_local("reactions:p1", JoinOptions::broadcast(true)).unwrap();
        let mut stream = channel.on_broadcast("reaction");

        channel.broadcast("reaction", json!(1)).await.unwrap();
        channel.broadcast("other", json!(2)).await.unwrap();

        assert_eq!(next(&mut stream).await, Some(json!(1)));
        assert_eq!(next(&mut stream).await, None);
    }

    #[tokio::test]
    async fn presence_counts_tracked_keys_and_forgets_on_leave() {
        let hub = LocalHub::default();
        let a = hub
            .join_local("lobby:p1", JoinOptions::with_presence_key("aaaaaaa"))
            .unwrap();
        let b = hub
            .join_local("lobby:p1", JoinOptions::with_presence_key("bbbbbbb"))
            .unwrap();

        a.track_presence(json!({"online_at": "now"})).await.unwrap();
        assert_eq!(hub.presence("lobby:p1").len(), 1);

        b.track_presence(json!({"online_at": "now"})).await.unwrap();
        let state = hub.presence("lobby:p1");
        assert_eq!(state.keys().collect::<Vec<_>>(), ["aaaaaaa", "bbbbbbb"]);

        b.leave().await.unwrap();
        assert_eq!(hub.presence("lobby:p1").len(), 1);
        assert!(b.track_presence(json!({})).await.is_err());

        drop(a);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn streams_end_when_the_channel_is_left() {
        let hub = LocalHub::default();
        let channel = hub.join_local("lobby:p1", JoinOptions::default()).unwrap();
        let mut presence = channel.on_presence_sync();
        assert_eq!(next(&mut presence).await, Some(PresenceState::new()));

        channel.leave().await.unwrap();
        assert!(presence.next().await.is_none());
    }

    #[tokio::test]
    async fn any_broadcast_stream_carries_event_names() {
        let hub = LocalHub::default();
        let sender = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let relay = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let mut all = relay.on_any_broadcast();

        sender.broadcast("reaction", json!(1)).await.unwrap();
        sender.broadcast("cheer", json!(2)).await.unwrap();

        assert_eq!(next(&mut all).await, Some(("reaction".to_string(), json!(1))));
        assert_eq!(next(&mut all).await, Some(("cheer".to_string(), json!(2))));
    }

    #[test]
    fn empty_topic_is_rejected() {
        let hub = LocalHub::default();
        assert!(matches!(
            hub.join_local(" ", JoinOptions::default()),
            Err(RealtimeError::JoinRejected { .. })
        ));
    }
}
