use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

use crate::dao::{
    models::{Attendee, Premiere},
    premiere_store::PremiereStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::RestConfig,
    error::{RestDaoError, RestResult},
    models::{ATTENDEES_TABLE, AttendeeRow, NewAttendeeRow, PREMIERES_TABLE, PremiereRow},
};

const API_PREFIX: &str = "rest/v1";

/// [`PremiereStore`] talking to a PostgREST-compatible HTTP API.
#[derive(Clone)]
pub struct RestPremiereStore {
    client: Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
}

impl RestPremiereStore {
    /// Build the HTTP client and verify the API answers.
    pub async fn connect(config: RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| RestDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            api_key: config.api_key.map(Arc::<str>::from),
        };

        store.ping().await?;
        Ok(store)
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, API_PREFIX, table);
        let builder = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            builder
                .header("apikey", key.as_ref())
                .bearer_auth(key.as_ref())
        } else {
            builder
        }
    }

    async fn ping(&self) -> RestResult<()> {
        let path = format!("{API_PREFIX}/");
        let response = self
            .request(Method::GET, "")
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: path.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RestDaoError::RequestStatus {
                path,
                status: response.status(),
            })
        }
    }

    /// Run a filtered select and return at most one row.
    async fn select_one<T>(&self, table: &str, query: &[(&str, String)]) -> RestResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(query)
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: table.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RestDaoError::RequestStatus {
                path: table.to_string(),
                status: response.status(),
            });
        }

        let mut rows =
            response
                .json::<Vec<T>>()
                .await
                .map_err(|source| RestDaoError::DecodeResponse {
                    path: table.to_string(),
                    source,
                })?;

        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn insert_attendee_row(&self, email: &str, premiere_id: &str) -> RestResult<Attendee> {
        let response = self
            .request(Method::POST, ATTENDEES_TABLE)
            .header("Prefer", "return=representation")
            .json(&[NewAttendeeRow { email, premiere_id }])
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: ATTENDEES_TABLE.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => {
                let rows = response.json::<Vec<AttendeeRow>>().await.map_err(|source| {
                    RestDaoError::DecodeResponse {
                        path: ATTENDEES_TABLE.to_string(),
                        source,
                    }
                })?;
                rows.into_iter()
                    .next()
                    .map(Attendee::from)
                    .ok_or_else(|| RestDaoError::EmptyRepresentation {
                        path: ATTENDEES_TABLE.to_string(),
                    })
            }
            status @ (StatusCode::CONFLICT
            | StatusCode::FORBIDDEN
            | StatusCode::UNAUTHORIZED
            | StatusCode::BAD_REQUEST) => Err(RestDaoError::WriteRejected {
                path: ATTENDEES_TABLE.to_string(),
                status,
            }),
            other => Err(RestDaoError::RequestStatus {
                path: ATTENDEES_TABLE.to_string(),
                status: other,
            }),
        }
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

impl PremiereStore for RestPremiereStore {
    fn upcoming_premiere(
        &self,
        after: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
        let store = self.clone();
        Box::pin(async move {
            let after = after.to_offset(UtcOffset::UTC).format(&Rfc3339).map_err(|err| {
                StorageError::unavailable("cannot format upcoming premiere bound".into(), err)
            })?;
            let row = store
                .select_one::<PremiereRow>(
                    PREMIERES_TABLE,
                    &[
                        ("scheduled_at", format!("gte.{after}")),
                        ("order", "scheduled_at.asc".to_string()),
                    ],
                )
                .await?;
            Ok(row.map(Premiere::from))
        })
    }

    fn premiere_by_id(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
        let store = self.clone();
        let filter = eq(id);
        Box::pin(async move {
            let row = store
                .select_one::<PremiereRow>(PREMIERES_TABLE, &[("id", filter)])
                .await?;
            Ok(row.map(Premiere::from))
        })
    }

    fn find_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Attendee>>> {
        let store = self.clone();
        let query = [("email", eq(email)), ("premiere_id", eq(premiere_id))];
        Box::pin(async move {
            let row = store
                .select_one::<AttendeeRow>(ATTENDEES_TABLE, &query)
                .await?;
            Ok(row.map(Attendee::from))
        })
    }

    fn insert_attendee(
        &self,
        email: &str,
        premiere_id: &str,
    ) -> BoxFuture<'static, StorageResult<Attendee>> {
        let store = self.clone();
        let email = email.to_string();
        let premiere_id = premiere_id.to_string();
        Box::pin(async move {
            store
                .insert_attendee_row(&email, &premiere_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
