//! Ephemeral emoji reactions fanned out to every viewer of a premiere.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::stream::BoxStream;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::realtime::Channel;

/// Broadcast event name carrying reactions.
pub const REACTION_EVENT: &str = "reaction";
/// Longest accepted emoji payload, in chars.
pub const MAX_EMOJI_CHARS: usize = 16;

/// Topic shared by every viewer of `premiere_id`.
pub fn reactions_topic(premiere_id: &str) -> String {
    format!("reactions:{premiere_id}")
}

/// Tunables of the reaction overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionSettings {
    /// Emojis offered in the picker. Sending is not restricted to this set.
    pub emojis: Vec<String>,
    /// How long a reaction stays visible after creation.
    pub lifetime: Duration,
    /// Most recent reactions kept; older ones are dropped.
    pub max_visible: usize,
    /// Lower bound of the random horizontal position.
    pub min_x: f64,
    /// Upper bound of the random horizontal position.
    pub max_x: f64,
    /// Whether our own broadcasts come back through the transport.
    pub self_echo: bool,
}

impl Default for ReactionSettings {
    fn default() -> Self {
        Self {
            emojis: ["🔥", "❤️", "🙌", "👀", "💯", "✨", "🎬", "🖤"]
                .into_iter()
                .map(String::from)
                .collect(),
            lifetime: Duration::from_millis(4_000),
            max_visible: 50,
            min_x: 10.0,
            max_x: 90.0,
            self_echo: false,
        }
    }
}

impl ReactionSettings {
    /// Bring the position bounds inside 0–100 in ascending order and keep the cap positive.
    pub fn normalized(mut self) -> Self {
        let lower = clamp_position(self.min_x);
        let upper = clamp_position(self.max_x);
        self.min_x = lower.min(upper);
        self.max_x = lower.max(upper);
        self.max_visible = self.max_visible.max(1);
        self
    }

    fn random_x(&self) -> f64 {
        if self.max_x > self.min_x {
            rand::rng().random_range(self.min_x..=self.max_x)
        } else {
            self.min_x
        }
    }
}

fn clamp_position(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 100.0) } else { 50.0 }
}

/// Reasons a remote payload is refused.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("reaction payload is not an object with an emoji: {0}")]
    Shape(String),
    #[error("reaction emoji is empty")]
    EmptyEmoji,
    #[error("reaction emoji exceeds {MAX_EMOJI_CHARS} chars")]
    EmojiTooLong,
    #[error("reaction position is not a finite number")]
    InvalidPosition,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    emoji: String,
    #[serde(default, alias = "horizontalPosition")]
    x: Option<f64>,
}

/// Validated wire shape of a reaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionPayload {
    /// Trimmed emoji, at most [`MAX_EMOJI_CHARS`] chars.
    pub emoji: String,
    /// Position in percent of the stage width, already clamped to 0–100.
    pub x: Option<f64>,
}

impl ReactionPayload {
    /// Validate an untrusted broadcast payload.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let raw: RawPayload =
            serde_json::from_value(value).map_err(|err| PayloadError::Shape(err.to_string()))?;

        let emoji = raw.emoji.trim();
        if emoji.is_empty() {
            return Err(PayloadError::EmptyEmoji);
        }
        if emoji.chars().count() > MAX_EMOJI_CHARS {
            return Err(PayloadError::EmojiTooLong);
        }

        let x = match raw.x {
            Some(x) if !x.is_finite() => return Err(PayloadError::InvalidPosition),
            Some(x) => Some(x.clamp(0.0, 100.0)),
            None => None,
        };

        Ok(Self {
            emoji: emoji.to_string(),
            x,
        })
    }
}

/// A reaction currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    /// Local identity, fresh for every copy shown.
    pub id: Uuid,
    pub emoji: String,
    /// Horizontal position in percent.
    pub x: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Reaction channel of one premiere plus the bounded list of visible reactions.
pub struct ReactionBus {
    settings: ReactionSettings,
    channel: Option<Arc<dyn Channel>>,
    incoming: Option<BoxStream<'static, Value>>,
    visible: VecDeque<Reaction>,
}

impl ReactionBus {
    /// Detached bus; `settings` are normalized first.
    pub fn new(settings: ReactionSettings) -> Self {
        Self {
            settings: settings.normalized(),
            channel: None,
            incoming: None,
            visible: VecDeque::new(),
        }
    }

    pub fn settings(&self) -> &ReactionSettings {
        &self.settings
    }

    /// Whether a reactions channel is currently joined.
    pub fn is_attached(&self) -> bool {
        self.channel.is_some()
    }

    /// Start receiving from `channel`, leaving any previous subscription first.
    pub async fn attach(&mut self, channel: Arc<dyn Channel>) {
        self.detach().await;
        self.incoming = Some(channel.on_broadcast(REACTION_EVENT));
        debug!(topic = channel.topic(), "reactions attached");
        self.channel = Some(channel);
    }

    /// Stop receiving and leave the channel. Reactions already visible expire normally.
    pub async fn detach(&mut self) {
        self.incoming = None;
        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.leave().await {
                debug!(topic = channel.topic(), error = %err, "failed to leave reactions channel");
            }
        }
    }

    /// Stream of raw payloads while attached.
    pub fn incoming(&mut self) -> Option<&mut BoxStream<'static, Value>> {
        self.incoming.as_mut()
    }

    /// Forget the stream after it ended without detaching from the channel.
    pub fn incoming_closed(&mut self) {
        if self.incoming.take().is_some() {
            debug!("reaction stream ended");
        }
    }

    /// Show `emoji` locally and publish it to the other viewers.
    pub fn send(&mut self, emoji: &str, now: OffsetDateTime) -> Reaction {
        let x = self.settings.random_x();
        let reaction = self.push(emoji.to_string(), x, now);

        if let Some(channel) = &self.channel {
            let payload = serde_json::json!({ "emoji": reaction.emoji, "x": reaction.x });
            let topic = channel.topic().to_string();
            let publish = channel.broadcast(REACTION_EVENT, payload);
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(err) = publish.await {
                            warn!(topic = %topic, error = %err, "failed to broadcast reaction");
                        }
                    });
                }
                Err(_) => warn!(topic = %topic, "no async runtime; reaction shown locally only"),
            }
        }

        reaction
    }

    /// Validate a remote payload and show it; malformed payloads are dropped.
    pub fn receive(&mut self, payload: Value, now: OffsetDateTime) -> Option<Reaction> {
        match ReactionPayload::from_value(payload) {
            Ok(ReactionPayload { emoji, x }) => {
                let x = x.unwrap_or_else(|| self.settings.random_x());
                Some(self.push(emoji, x, now))
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed reaction payload");
                None
            }
        }
    }

    /// Drop reactions whose lifetime has elapsed; returns how many were removed.
    pub fn sweep(&mut self, now: OffsetDateTime) -> usize {
        let lifetime = self.settings.lifetime;
        let before = self.visible.len();
        self.visible
            .retain(|reaction| now - reaction.created_at < lifetime);
        before - self.visible.len()
    }

    /// Reactions on screen, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &Reaction> {
        self.visible.iter()
    }

    /// Number of reactions on screen.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// True when nothing is on screen.
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    fn push(&mut self, emoji: String, x: f64, now: OffsetDateTime) -> Reaction {
        let reaction = Reaction {
            id: Uuid::new_v4(),
            emoji,
            x,
            created_at: now,
        };
        self.visible.push_back(reaction.clone());
        while self.visible.len() > self.settings.max_visible {
            self.visible.pop_front();
        }
        reaction
    }
}
