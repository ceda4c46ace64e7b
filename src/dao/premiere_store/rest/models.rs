use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::models::{Attendee, Premiere};

pub const PREMIERES_TABLE: &str = "premieres";
pub const ATTENDEES_TABLE: &str = "attendees";

/// Row layout of the `premieres` table.
#[derive(Debug, Deserialize)]
pub struct PremiereRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub mux_playback_id: String,
    #[serde(default)]
    pub mux_asset_id: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl From<PremiereRow> for Premiere {
    fn from(row: PremiereRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            playback_id: row.mux_playback_id,
            asset_id: row.mux_asset_id,
            thumbnail_url: row.thumbnail_url,
            scheduled_at: row.scheduled_at,
            is_live: row.is_live,
            created_at: row.created_at,
        }
    }
}

/// Row layout of the `attendees` table.
#[derive(Debug, Deserialize)]
pub struct AttendeeRow {
    pub id: Uuid,
    pub email: String,
    pub premiere_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
}

impl From<AttendeeRow> for Attendee {
    fn from(row: AttendeeRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            premiere_id: row.premiere_id,
            joined_at: row.joined_at,
        }
    }
}

/// Insert payload for the `attendees` table.
#[derive(Debug, Serialize)]
pub struct NewAttendeeRow<'a> {
    pub email: &'a str,
    pub premiere_id: &'a str,
}
