use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// A scheduled single video broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Premiere {
    /// Stable identifier of the premiere.
    pub id: String,
    /// Title shown in the lobby and the theater.
    pub title: String,
    /// Optional blurb shown under the title.
    #[serde(default)]
    pub description: Option<String>,
    /// Identifier of the video asset used by both players.
    pub playback_id: String,
    /// Identifier of the source asset on the video platform.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Poster image shown before playback.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Instant the broadcast goes live.
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    /// Flag maintained by the operator once the stream has started.
    #[serde(default)]
    pub is_live: bool,
    /// Creation time of the record.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// Someone registered to watch a premiere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attendee {
    /// Row identifier assigned on insert.
    pub id: Uuid,
    /// Lowercased email used to register.
    pub email: String,
    /// Premiere the attendee registered for.
    pub premiere_id: String,
    /// Registration time.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
}

/// Proof that an email may enter a given premiere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AccessRecord {
    /// Premiere the grant applies to.
    pub premiere_id: String,
    /// Lowercased email the grant was issued for.
    pub email: String,
}

impl From<&Attendee> for AccessRecord {
    fn from(attendee: &Attendee) -> Self {
        Self {
            premiere_id: attendee.premiere_id.clone(),
            email: attendee.email.clone(),
        }
    }
}
