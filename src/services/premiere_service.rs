use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    access::{normalize_email, register_attendee},
    dto::premiere::{AccessResponse, PremiereResponse, RegisterAttendeeRequest},
    error::ServiceError,
    state::SharedState,
};

/// Next premiere scheduled at or after now.
pub async fn upcoming(state: &SharedState) -> Result<PremiereResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = OffsetDateTime::now_utc();
    let premiere = state
        .with_timeout(async { Ok(store.upcoming_premiere(now).await?) })
        .await?
        .ok_or_else(|| ServiceError::NotFound("no upcoming premiere".into()))?;

    debug!(premiere_id = %premiere.id, "upcoming premiere resolved");
    Ok(premiere.into())
}

pub async fn by_id(state: &SharedState, id: &str) -> Result<PremiereResponse, ServiceError> {
    let store = state.require_store().await?;
    let premiere = state
        .with_timeout(async { Ok(store.premiere_by_id(id).await?) })
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("premiere `{id}`")))?;
    Ok(premiere.into())
}

/// Register `request.email` for premiere `id`, returning the existing grant when already registered.
pub async fn register(
    state: &SharedState,
    id: &str,
    request: RegisterAttendeeRequest,
) -> Result<AccessResponse, ServiceError> {
    let email = normalize_email(&request.email)
        .ok_or_else(|| ServiceError::InvalidInput("Enter a valid email".into()))?;
    let store = state.require_store().await?;

    state
        .with_timeout(async {
            if store.premiere_by_id(id).await?.is_none() {
                return Err(ServiceError::NotFound(format!("premiere `{id}`")));
            }
            Ok(())
        })
        .await?;

    let record = state
        .with_timeout(async { Ok(register_attendee(store.as_ref(), id, &email).await?) })
        .await?;

    info!(premiere_id = %id, "attendee access granted");
    Ok(record.into())
}
