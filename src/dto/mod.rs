use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod premiere;
pub mod realtime;
pub mod theater;
pub mod token;
pub mod validation;

fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
