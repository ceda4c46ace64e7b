//! Process-local store used when no remote database is configured, and by tests.

use std::sync::Arc;

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{Attendee, Premiere},
    premiere_store::PremiereStore,
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct Tables {
    premieres: Vec<Premiere>,
    attendees: Vec<Attendee>,
}

/// In-memory [`PremiereStore`]; clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryPremiereStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryPremiereStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with premieres.
    pub fn with_premieres(premieres: impl IntoIterator<Item = Premiere>) -> Self {
        let tables = Tables {
            premieres: premieres.into_iter().collect(),
            attendees: Vec::new(),
        };
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Add or replace a premiere.
    pub async fn upsert_premiere(&self, premiere: Premiere) {
        let mut tables = self.tables.write().await;
        tables.premieres.retain(|existing| existing.id != premiere.id);
        tables.premieres.push(premiere);
    }

    /// Number of attendees registered for `premiere_id`.
    pub async fn attendee_count(&self, premiere_id: &str) -> usize {
        let tables = self.tables.read().await;
        tables
            .attendees
            .iter()
            .filter(|attendee| attendee.premiere_id == premiere_id)
            .count()
    }
}

impl PremiereStore for MemoryPremiereStore {
    fn upcoming_premiere(
        &self,
        after: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let tables = tables.read().await;
            Ok(tables
                .premieres
                .iter()
                .filter(|premiere| premiere.scheduled_at >= after)
                .min_by_key(|premiere| premiere.scheduled_at)
                .cloned())
        })
    }

    fn premiere_by_id(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
        let tables = self.tables.clone();
        let id = id.to_string();
        Box::pin(async move {
            let tables = tables.read().await;
            Ok(tables
                .premieres
                .iter()
                .find(|premiere| premiere.id == id)
                .cloned())
        })
    }

    fn find_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Attendee>>> {
        let tables = self.tables.clone();
        let email = email.to_string();
        let premiere_id = premiere_id.to_string();
        Box::pin(async move {
            let tables = tables.read().await;
            Ok(tables
                .attendees
                .iter()
                .find(|attendee| attendee.email == email && attendee.premiere_id == premiere_id)
                .cloned())
        })
    }

    fn insert_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Attendee>> {
        let tables = self.tables.clone();
        let email = email.to_string();
        let premiere_id = premiere_id.to_string();
        Box::pin(async move {
            let mut tables = tables.write().await;
            if tables
                .attendees
                .iter()
                .any(|attendee| attendee.email == email && attendee.premiere_id == premiere_id)
            {
                return Err(StorageError::rejected(format!(
                    "attendee `{email}` already registered for premiere `{premiere_id}`"
                )));
            }

            let attendee = Attendee {
                id: Uuid::new_v4(),
                email,
                premiere_id,
                joined_at: Some(OffsetDateTime::now_utc()),
            };
            tables.attendees.push(attendee.clone());
            Ok(attendee)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;

    fn premiere(id: &str, scheduled_at: OffsetDateTime) -> Premiere {
        Premiere {
            id: id.into(),
            title: format!("Premiere {id}"),
            description: None,
            playback_id: format!("playback-{id}"),
            asset_id: None,
            thumbnail_url: None,
            scheduled_at,
            is_live: false,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn upcoming_returns_the_earliest_future_premiere() {
        let now = datetime!(2025-05-01 12:00 UTC);
        let store = MemoryPremiereStore::with_premieres([
            premiere("past", now - Duration::days(1)),
            premiere("later", now + Duration::days(3)),
            premiere("next", now + Duration::hours(2)),
        ]);

        let upcoming = store.upcoming_premiere(now).await.unwrap().unwrap();
        assert_eq!(upcoming.id, "next");

        let none = store
            .upcoming_premiere(now + Duration::days(10))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn duplicate_attendee_insert_is_rejected() {
        let store = MemoryPremiereStore::new();
        store.insert_attendee("a@b.c", "p1").await.unwrap();

        let err = store.insert_attendee("a@b.c", "p1").await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));
        assert_eq!(store.attendee_count("p1").await, 1);

        let found = store.find_attendee("a@b.c", "p1").await.unwrap();
        assert!(found.is_some());
    }
}
