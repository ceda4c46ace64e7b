use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::realtime::PresenceState;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from realtime WebSocket clients.
#[serde(tag = "type")]
pub enum RealtimeInboundMessage {
    /// Must be the first frame: registers the socket on the topic.
    #[serde(rename = "join")]
    Join {
        #[serde(default)]
        key: Option<String>,
        /// Echo this client's own broadcasts back to it.
        #[serde(rename = "self", default)]
        self_echo: bool,
    },
    #[serde(rename = "broadcast")]
    Broadcast {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "track")]
    Track {
        #[serde(default)]
        payload: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages pushed to realtime WebSocket clients.
#[serde(tag = "type")]
pub enum RealtimeOutboundMessage {
    /// Acknowledges the join with the presence key in use.
    #[serde(rename = "joined")]
    Joined { key: String },
    #[serde(rename = "broadcast")]
    Broadcast { event: String, payload: Value },
    #[serde(rename = "presence_sync")]
    PresenceSync {
        #[schema(value_type = Object)]
        state: PresenceState,
    },
}
