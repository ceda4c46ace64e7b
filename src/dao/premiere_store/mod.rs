pub mod memory;
#[cfg(feature = "rest")]
pub mod rest;

use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::dao::{
    models::{Attendee, Premiere},
    storage::StorageResult,
};

/// Abstraction over the persistence layer for premieres and their attendees.
pub trait PremiereStore: Send + Sync {
    /// Earliest premiere scheduled at or after `after`.
    fn upcoming_premiere(
        &self,
        after: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<Premiere>>>;
    fn premiere_by_id(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Premiere>>>;
    fn find_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Attendee>>>;
    fn insert_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Attendee>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
