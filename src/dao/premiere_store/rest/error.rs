//! Error types shared by the REST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`RestDaoError`] failures.
pub type RestResult<T> = Result<T, RestDaoError>;

/// Failures that can occur while interacting with the REST database API.
#[derive(Debug, Error)]
pub enum RestDaoError {
    /// Required environment variable is missing.
    #[error("missing REST storage environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build REST storage client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request to a table endpoint could not be sent.
    #[error("failed to send REST request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The API returned an unexpected status code.
    #[error("unexpected REST response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// The API refused a write (unique violation, row-level security, ...).
    #[error("REST API rejected write to `{path}` with status {status}")]
    WriteRejected { path: String, status: StatusCode },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode REST response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A write succeeded but returned no representation.
    #[error("REST API returned no row for `{path}`")]
    EmptyRepresentation { path: String },
}

impl From<RestDaoError> for StorageError {
    fn from(err: RestDaoError) -> Self {
        match err {
            RestDaoError::WriteRejected { .. } => StorageError::rejected(err.to_string()),
            other => StorageError::unavailable("REST storage failure".into(), other),
        }
    }
}
