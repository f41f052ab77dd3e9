//! Pending authorization contexts for CSRF and replay protection.
//!
//! A context is created when an authorization flow starts and consumed when
//! the vendor redirects back. Contexts are keyed by session, platform and
//! state token, so one session can never complete another session's flow.

use crate::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Lookup key of a pending authorization context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub session_id: String,
    pub platform: Platform,
    pub state: String,
}

/// Server-side record correlating an OAuth `state` with the initiating user.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAuthorization {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// PKCE verifier, for platforms that require one
    pub code_verifier: Option<String>,
}

/// Key-value storage for pending authorization contexts with TTL semantics.
///
/// Implementations must never return an expired entry from [`get`](Self::get)
/// or [`delete`](Self::delete).
pub trait StateStore: Send + Sync {
    /// Stores a context; it stops being readable after `ttl`.
    fn put(&self, key: StateKey, value: PendingAuthorization, ttl: Duration);

    /// Reads a live context without consuming it.
    fn get(&self, key: &StateKey) -> Option<PendingAuthorization>;

    /// Removes a context, returning it if it was still live.
    fn delete(&self, key: &StateKey) -> Option<PendingAuthorization>;

    /// Drops expired contexts, returning how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of stored contexts, expired or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`StateStore`] (resets on restart).
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<StateKey, (PendingAuthorization, DateTime<Utc>)>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn put(&self, key: StateKey, value: PendingAuthorization, ttl: Duration) {
        let deadline = Utc::now() + ttl;
        self.entries.insert(key, (value, deadline));
    }

    fn get(&self, key: &StateKey) -> Option<PendingAuthorization> {
        let entry = self.entries.get(key)?;
        let (value, deadline) = entry.value();
        if *deadline <= Utc::now() {
            return None;
        }
        Some(value.clone())
    }

    fn delete(&self, key: &StateKey) -> Option<PendingAuthorization> {
        let (_, (value, deadline)) = self.entries.remove(key)?;
        if deadline <= Utc::now() {
            return None;
        }
        Some(value)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (_, deadline)| *deadline > now);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Issues and consumes state tokens over a [`StateStore`].
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn StateStore>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `store` - Backing key-value store
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes)
    pub fn new(store: Arc<dyn StateStore>, expiry_seconds: i64) -> Self {
        Self {
            store,
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    /// In-memory state manager
    pub fn in_memory(expiry_seconds: i64) -> Self {
        Self::new(Arc::new(MemoryStateStore::new()), expiry_seconds)
    }

    /// Generates a fresh state token and records its context.
    ///
    /// Returns the state token (UUID v4). A token is never reissued while
    /// another live context holds it.
    pub fn create_state(
        &self,
        session_id: &str,
        platform: Platform,
        user_id: &str,
        code_verifier: Option<String>,
    ) -> String {
        let mut key = StateKey {
            session_id: session_id.to_string(),
            platform,
            state: Uuid::new_v4().to_string(),
        };
        while self.store.get(&key).is_some() {
            key.state = Uuid::new_v4().to_string();
        }

        let now = Utc::now();
        let state = key.state.clone();
        self.store.put(
            key,
            PendingAuthorization {
                user_id: user_id.to_string(),
                created_at: now,
                expires_at: now + self.expiry_duration,
                code_verifier,
            },
            self.expiry_duration,
        );

        state
    }

    /// Validates and consumes a state token.
    ///
    /// The context is removed whether or not it is still valid (single-use).
    /// Returns `None` if it was never issued, already consumed, or expired.
    pub fn validate_and_consume(
        &self,
        session_id: &str,
        platform: Platform,
        state: &str,
    ) -> Option<PendingAuthorization> {
        self.store.delete(&StateKey {
            session_id: session_id.to_string(),
            platform,
            state: state.to_string(),
        })
    }

    /// Lifetime of a newly issued state
    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_duration.num_seconds()
    }

    /// Clean up expired states (should be called periodically)
    pub fn cleanup_expired(&self) -> usize {
        self.store.purge_expired(Utc::now())
    }

    /// Get count of stored states (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.store.len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    // tokio panics on a zero period
    let period = tokio::time::Duration::from_secs(interval_seconds.max(1));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        let removed = manager.cleanup_expired();
        tracing::debug!(
            removed,
            remaining = manager.count(),
            "OAuth state cleanup complete"
        );
    }
}
