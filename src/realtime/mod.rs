//! Pub/sub transport seen by the theater: topic channels carrying broadcasts and presence.

mod hub;

use std::sync::Arc;

use futures::{future::BoxFuture, stream::BoxStream};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

pub use self::hub::{LocalChannel, LocalHub};

/// Presence snapshot: client key → metadata entries tracked under that key, in join order.
pub type PresenceState = IndexMap<String, Vec<Value>>;

/// Result alias for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Failures raised by a realtime transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The channel was left or its transport went away.
    #[error("channel `{topic}` is closed")]
    Closed { topic: String },
    /// The transport refused the subscription.
    #[error("join rejected for `{topic}`: {reason}")]
    JoinRejected { topic: String, reason: String },
    /// Any other transport failure.
    #[error("realtime transport error: {0}")]
    Transport(String),
}

/// Options passed when joining a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    /// Key under which this client's presence is tracked; generated when absent.
    pub presence_key: Option<String>,
    /// Deliver this client's own broadcasts back to it.
    pub self_echo: bool,
}

impl JoinOptions {
    /// Options for a presence-tracking subscription.
    pub fn with_presence_key(key: impl Into<String>) -> Self {
        Self {
            presence_key: Some(key.into()),
            self_echo: false,
        }
    }

    /// Options for a broadcast subscription.
    pub fn broadcast(self_echo: bool) -> Self {
        Self {
            presence_key: None,
            self_echo,
        }
    }
}

/// A joined topic.
///
/// Streams returned by the `on_*` methods end once the channel is left or dropped.
pub trait Channel: Send + Sync {
    /// Topic name this channel is subscribed to.
    fn topic(&self) -> &str;

    /// Key this client's presence is tracked under.
    fn presence_key(&self) -> &str;

    /// Publish `payload` under `event` to every subscriber of the topic.
    fn broadcast(&self, event: &str, payload: Value) -> BoxFuture<'static, RealtimeResult<()>>;

    /// Payloads of broadcasts matching `event`.
    fn on_broadcast(&self, event: &str) -> BoxStream<'static, Value>;

    /// Announce this client with `meta`, replacing any previous metadata.
    fn track_presence(&self, meta: Value) -> BoxFuture<'static, RealtimeResult<()>>;

    /// Presence snapshots, starting with the current one.
    fn on_presence_sync(&self) -> BoxStream<'static, PresenceState>;

    /// Leave the topic and drop this client's presence.
    fn leave(&self) -> BoxFuture<'static, RealtimeResult<()>>;
}

/// Entry point of a realtime transport.
pub trait Realtime: Send + Sync {
    /// Subscribe to `topic`.
    fn join(
        &self,
        topic: &str,
        options: JoinOptions,
    ) -> BoxFuture<'static, RealtimeResult<Arc<dyn Channel>>>;
}
