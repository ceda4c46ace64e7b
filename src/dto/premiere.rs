use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::{AccessRecord, Premiere};

use super::{format_timestamp, validation::validate_email_address};

/// Premiere as returned to clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PremiereResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub playback_id: String,
    pub thumbnail_url: Option<String>,
    /// RFC 3339 start time.
    pub scheduled_at: String,
    pub is_live: bool,
}

impl From<Premiere> for PremiereResponse {
    fn from(premiere: Premiere) -> Self {
        Self {
            id: premiere.id,
            title: premiere.title,
            description: premiere.description,
            playback_id: premiere.playback_id,
            thumbnail_url: premiere.thumbnail_url,
            scheduled_at: format_timestamp(premiere.scheduled_at),
            is_live: premiere.is_live,
        }
    }
}

/// Body of `POST /premieres/{id}/attendees`.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct RegisterAttendeeRequest {
    #[validate(
        length(max = 254, message = "email is too long"),
        custom(function = validate_email_address)
    )]
    pub email: String,
}

/// Access grant returned after a successful registration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub premiere_id: String,
    pub email: String,
}

impl From<AccessRecord> for AccessResponse {
    fn from(record: AccessRecord) -> Self {
        Self {
            premiere_id: record.premiere_id,
            email: record.email,
        }
    }
}
