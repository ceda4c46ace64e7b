//! Email gate deciding whether a viewer may proceed to the theater.

pub mod cache;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::dao::{
    models::AccessRecord,
    premiere_store::PremiereStore,
    storage::{StorageError, StorageResult},
};

pub use self::cache::{AccessCache, CacheError, FileAccessCache, MemoryAccessCache, cache_key};

/// Why a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    /// The address does not look like an email.
    InvalidEmail,
    /// The attendee could not be recorded remotely.
    RegistrationFailed,
}

impl DenyReason {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InvalidEmail => "invalid-email",
            DenyReason::RegistrationFailed => "registration-failed",
        }
    }

    /// Inline message shown under the email field.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::InvalidEmail => "Enter a valid email",
            DenyReason::RegistrationFailed => "Failed to register",
        }
    }
}

/// Observable state of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// No grant yet.
    Locked,
    /// A registration is in flight.
    Submitting,
    /// Access granted to `email`; terminal.
    Granted { email: String },
    /// Last submission was refused; another attempt may be made.
    Denied { reason: DenyReason },
}

/// Registration work the caller must carry out after [`AccessGate::begin_submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub premiere_id: String,
    pub email: String,
}

/// Outcome of the synchronous half of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStep {
    /// Nothing to do: already granted, or a submission is already in flight.
    Ignored,
    /// Refused locally, no network involved.
    Rejected(DenyReason),
    /// Valid address; run [`register_attendee`] and feed the result to [`AccessGate::complete`].
    Register(Registration),
}

/// Normalize `email` for storage, or `None` when it fails the syntactic check.
pub fn normalize_email(email: &str) -> Option<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Find-or-insert the attendee for `(email, premiere_id)`.
///
/// A failing lookup is treated as "not registered yet"; the insert then decides the outcome.
pub async fn register_attendee(
    store: &dyn PremiereStore,
    premiere_id: &str,
    email: &str,
) -> StorageResult<AccessRecord> {
    match store.find_attendee(email, premiere_id).await {
        Ok(Some(existing)) => return Ok(AccessRecord::from(&existing)),
        Ok(None) => {}
        Err(err) => {
            warn!(premiere_id, error = %err, "attendee lookup failed; attempting registration");
        }
    }

    let inserted = store.insert_attendee(email, premiere_id).await?;
    info!(premiere_id, "attendee registered");
    Ok(AccessRecord::from(&inserted))
}

/// State machine `Locked → Submitting → {Granted, Denied}` for one premiere.
pub struct AccessGate {
    premiere_id: String,
    store: Arc<dyn PremiereStore>,
    cache: Arc<dyn AccessCache>,
    state: GateState,
}

impl AccessGate {
    /// Build the gate, jumping straight to `Granted` when the local cache holds a grant.
    pub fn restore(
        premiere_id: impl Into<String>,
        store: Arc<dyn PremiereStore>,
        cache: Arc<dyn AccessCache>,
    ) -> Self {
        let premiere_id = premiere_id.into();
        let state = match cache.load(&premiere_id) {
            Some(email) => GateState::Granted { email },
            None => GateState::Locked,
        };
        Self {
            premiere_id,
            store,
            cache,
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Whether the viewer may enter.
    pub fn is_granted(&self) -> bool {
        matches!(self.state, GateState::Granted { .. })
    }

    /// Store used for registrations.
    pub fn store(&self) -> Arc<dyn PremiereStore> {
        self.store.clone()
    }

    /// Validate `email` and move to `Submitting` when a registration must be performed.
    pub fn begin_submit(&mut self, email: &str) -> SubmitStep {
        if matches!(self.state, GateState::Granted { .. } | GateState::Submitting) {
            return SubmitStep::Ignored;
        }

        let Some(email) = normalize_email(email) else {
            self.state = GateState::Denied {
                reason: DenyReason::InvalidEmail,
            };
            return SubmitStep::Rejected(DenyReason::InvalidEmail);
        };

        self.state = GateState::Submitting;
        SubmitStep::Register(Registration {
            premiere_id: self.premiere_id.clone(),
            email,
        })
    }

    /// Apply the registration outcome. The local grant is written only after remote success.
    pub fn complete(&mut self, outcome: StorageResult<AccessRecord>) -> &GateState {
        if !matches!(self.state, GateState::Submitting) {
            warn!(premiere_id = %self.premiere_id, "registration outcome arrived while not submitting");
            return &self.state;
        }

        self.state = match outcome {
            Ok(record) => {
                if let Err(err) = self.cache.store(&self.premiere_id, &record.email) {
                    warn!(premiere_id = %self.premiere_id, error = %err, "failed to persist access grant locally");
                }
                GateState::Granted {
                    email: record.email,
                }
            }
            Err(err) => {
                log_registration_failure(&self.premiere_id, &err);
                GateState::Denied {
                    reason: DenyReason::RegistrationFailed,
                }
            }
        };
        &self.state
    }

    /// Submit `email` and wait for the registration to finish.
    pub async fn submit(&mut self, email: &str) -> &GateState {
        if let SubmitStep::Register(registration) = self.begin_submit(email) {
            let store = self.store.clone();
            let outcome =
                register_attendee(store.as_ref(), &registration.premiere_id, &registration.email)
                    .await;
            self.complete(outcome);
        }
        &self.state
    }
}

fn log_registration_failure(premiere_id: &str, err: &StorageError) {
    match err {
        StorageError::Rejected { .. } => {
            warn!(premiere_id, error = %err, "attendee registration rejected")
        }
        StorageError::Unavailable { .. } => {
            warn!(premiere_id, error = %err, "attendee registration failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use time::OffsetDateTime;

    use super::*;
    use crate::dao::{
        models::{Attendee, Premiere},
        premiere_store::memory::MemoryPremiereStore,
    };

    /// Wraps the memory store, counting calls and optionally failing writes.
    struct CountingStore {
        inner: MemoryPremiereStore,
        lookups: AtomicUsize,
        inserts: AtomicUsize,
        fail_inserts: bool,
        fail_lookups: bool,
    }

    impl CountingStore {
        fn new(fail_lookups: bool, fail_inserts: bool) -> Self {
            Self {
                inner: MemoryPremiereStore::new(),
                lookups: AtomicUsize::new(0),
                inserts: AtomicUsize::new(0),
                fail_inserts,
                fail_lookups,
            }
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.lookups.load(Ordering::SeqCst),
                self.inserts.load(Ordering::SeqCst),
            )
        }
    }

    fn outage() -> StorageError {
        StorageError::unavailable(
            "simulated outage".into(),
            std::io::Error::other("connection reset"),
        )
    }

    impl PremiereStore for CountingStore {
        fn upcoming_premiere(
            &self,
            after: OffsetDateTime,
        ) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
            self.inner.upcoming_premiere(after)
        }

        fn premiere_by_id(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Premiere>>> {
            self.inner.premiere_by_id(id)
        }

        fn find_attendee(
            &self,
            email: &str,
            premiere_id: &str,
        ) -> BoxFuture<'static, StorageResult<Option<Attendee>>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookups {
                return Box::pin(async { Err(outage()) });
            }
            self.inner.find_attendee(email, premiere_id)
        }

        fn insert_attendee(
            &self,
            email: &str,
            premiere_id: &str,
        ) -> BoxFuture<'static, StorageResult<Attendee>> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_inserts {
                return Box::pin(async { Err(outage()) });
            }
            self.inner.insert_attendee(email, premiere_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
    }

    fn gate(store: Arc<CountingStore>, cache: Arc<MemoryAccessCache>) -> AccessGate {
        AccessGate::restore("premiere-1", store, cache)
    }

    #[tokio::test]
    async fn invalid_email_is_denied_without_network() {
        let store = Arc::new(CountingStore::new(false, false));
        let mut gate = gate(store.clone(), Arc::new(MemoryAccessCache::new()));

        let state = gate.submit("not-an-email").await.clone();
        assert_eq!(
            state,
            GateState::Denied {
                reason: DenyReason::InvalidEmail
            }
        );
        assert_eq!(store.calls(), (0, 0));
    }

    #[tokio::test]
    async fn fresh_email_is_registered_and_cached() {
        let store = Arc::new(CountingStore::new(false, false));
        let cache = Arc::new(MemoryAccessCache::new());
        let mut gate = gate(store.clone(), cache.clone());

        let state = gate.submit("  Viewer@Example.com ").await.clone();
        assert_eq!(
            state,
            GateState::Granted {
                email: "viewer@example.com".into()
            }
        );
        assert_eq!(store.calls(), (1, 1));
        assert_eq!(
            cache.load("premiere-1").as_deref(),
            Some("viewer@example.com")
        );
    }

    #[tokio::test]
    async fn registered_email_is_granted_without_duplicate_insert() {
        let store = Arc::new(CountingStore::new(false, false));
        store
            .inner
            .insert_attendee("viewer@example.com", "premiere-1")
            .await
            .unwrap();

        let mut gate = gate(store.clone(), Arc::new(MemoryAccessCache::new()));
        assert!(matches!(
            gate.submit("viewer@example.com").await,
            GateState::Granted { .. }
        ));
        assert_eq!(store.calls(), (1, 0));
        assert_eq!(store.inner.attendee_count("premiere-1").await, 1);
    }

    #[tokio::test]
    async fn insert_failure_denies_and_leaves_cache_untouched() {
        let store = Arc::new(CountingStore::new(false, true));
        let cache = Arc::new(MemoryAccessCache::new());
        let mut gate = gate(store, cache.clone());

        let state = gate.submit("viewer@example.com").await.clone();
        assert_eq!(
            state,
            GateState::Denied {
                reason: DenyReason::RegistrationFailed
            }
        );
        assert_eq!(cache.load("premiere-1"), None);
    }

    #[tokio::test]
    async fn lookup_failure_falls_through_to_insert() {
        let store = Arc::new(CountingStore::new(true, false));
        let mut gate = gate(store.clone(), Arc::new(MemoryAccessCache::new()));

        assert!(gate.submit("viewer@example.com").await == &GateState::Granted {
            email: "viewer@example.com".into()
        });
        assert_eq!(store.calls(), (1, 1));
    }

    #[tokio::test]
    async fn cached_grant_restores_without_prompting() {
        let store = Arc::new(CountingStore::new(false, false));
        let cache = Arc::new(MemoryAccessCache::new());
        cache.store("premiere-1", "back@example.com").unwrap();

        let mut gate = gate(store.clone(), cache);
        assert!(gate.is_granted());
        assert_eq!(gate.begin_submit("other@example.com"), SubmitStep::Ignored);
        assert_eq!(store.calls(), (0, 0));
    }

    #[test]
    fn second_submit_while_in_flight_is_ignored() {
        let store = Arc::new(CountingStore::new(false, false));
        let mut gate = gate(store, Arc::new(MemoryAccessCache::new()));

        assert!(matches!(
            gate.begin_submit("a@b.c"),
            SubmitStep::Register(_)
        ));
        assert_eq!(gate.state(), &GateState::Submitting);
        assert_eq!(gate.begin_submit("a@b.c"), SubmitStep::Ignored);
    }

    #[test]
    fn denied_gate_accepts_a_retry() {
        let store = Arc::new(CountingStore::new(false, false));
        let mut gate = gate(store, Arc::new(MemoryAccessCache::new()));

        assert_eq!(
            gate.begin_submit("nope"),
            SubmitStep::Rejected(DenyReason::InvalidEmail)
        );
        assert!(matches!(
            gate.begin_submit("yes@example.com"),
            SubmitStep::Register(Registration { ref email, .. }) if email == "yes@example.com"
        ));
    }
}
