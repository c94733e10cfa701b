//! Server-side session store.
//!
//! Sessions are keyed by an opaque UUID carried in a cookie. Each request gets
//! a [`Session`] handle; handlers only ever see their own session's data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Well-known session keys.
pub struct SessionKey;

impl SessionKey {
    pub const ACCESS_TOKEN: &'static str = "supabase_access_token";
    pub const REFRESH_TOKEN: &'static str = "supabase_refresh_token";
    pub const USER: &'static str = "supabase_user";
}

/// Keys cleared on logout or irrecoverable auth failure.
pub const AUTH_KEYS: [&str; 3] = [SessionKey::ACCESS_TOKEN, SessionKey::REFRESH_TOKEN, SessionKey::USER];

#[derive(Default)]
struct SessionEntry {
    data: RwLock<HashMap<String, Value>>,
    refresh_lock: Mutex<()>,
}

/// What happened to a session during one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New session that received data; the client needs a cookie.
    Created,
    /// Existing session written during the request.
    Updated,
    /// Existing session now empty and dropped; the cookie should be removed.
    Destroyed,
    Untouched,
}

/// In-memory session store with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<String, Arc<SessionEntry>>,
}

impl SessionStore {
    pub fn new(idle_lifetime: Duration, max_sessions: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_lifetime)
            .build();
        Self { cache }
    }

    /// Resolve the session for an incoming cookie value, or start a fresh one.
    ///
    /// Unknown, expired or malformed ids get a new id so clients cannot pick their own.
    pub async fn load(&self, id: Option<&str>) -> Session {
        if let Some(id) = id.filter(|id| Uuid::parse_str(id).is_ok()) {
            if let Some(entry) = self.cache.get(id).await {
                return Session { id: id.to_string(), entry, is_new: false, dirty: Arc::new(AtomicBool::new(false)) };
            }
            debug!("unknown or expired session id; starting a new session");
        }
        Session::fresh()
    }

    /// Persist the outcome of a request.
    pub async fn commit(&self, session: &Session) -> CommitOutcome {
        if !session.is_dirty() {
            return CommitOutcome::Untouched;
        }
        let empty = session.is_empty().await;
        match (session.is_new, empty) {
            (true, true) => CommitOutcome::Untouched,
            (true, false) => {
                self.cache.insert(session.id.clone(), Arc::clone(&session.entry)).await;
                common::metrics::SESSIONS_CREATED_TOTAL.inc();
                CommitOutcome::Created
            }
            (false, true) => {
                self.cache.invalidate(&session.id).await;
                CommitOutcome::Destroyed
            }
            (false, false) => CommitOutcome::Updated,
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.cache.get(id).await.is_some()
    }
}

fn non_empty_str(data: &HashMap<String, Value>, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Per-request handle to one session.
#[derive(Clone)]
pub struct Session {
    id: String,
    entry: Arc<SessionEntry>,
    is_new: bool,
    dirty: Arc<AtomicBool>,
}

impl Session {
    fn fresh() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entry: Arc::new(SessionEntry::default()),
            is_new: true,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Detached session, not backed by any store. Useful for tests and one-off calls.
    pub fn detached() -> Self {
        Self::fresh()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entry.data.read().await.get(key).cloned()
    }

    /// Merge fields into the session. A `Null` value removes the key.
    pub async fn set<K, I>(&self, fields: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut data = self.entry.data.write().await;
        for (k, v) in fields {
            if v.is_null() {
                data.remove(&k.into());
            } else {
                data.insert(k.into(), v);
            }
        }
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn clear(&self, keys: &[&str]) {
        let mut data = self.entry.data.write().await;
        for k in keys {
            data.remove(*k);
        }
        self.dirty.store(true, Ordering::Release);
    }

    pub async fn is_empty(&self) -> bool {
        self.entry.data.read().await.is_empty()
    }

    /// Non-empty string value for `key`.
    pub async fn get_str(&self, key: &str) -> Option<String> {
        non_empty_str(&*self.entry.data.read().await, key)
    }

    /// `(access, refresh)` read under one guard, so both belong to the same grant.
    pub async fn tokens(&self) -> (Option<String>, Option<String>) {
        let data = self.entry.data.read().await;
        (non_empty_str(&data, SessionKey::ACCESS_TOKEN), non_empty_str(&data, SessionKey::REFRESH_TOKEN))
    }

    pub async fn access_token(&self) -> Option<String> {
        self.get_str(SessionKey::ACCESS_TOKEN).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.get_str(SessionKey::REFRESH_TOKEN).await
    }

    pub async fn user(&self) -> Option<Value> {
        self.get(SessionKey::USER).await
    }

    /// Drop every auth key.
    pub async fn forget_auth(&self) {
        self.clear(&AUTH_KEYS).await;
    }

    /// Serializes token refreshes for this session.
    pub async fn refresh_lock(&self) -> MutexGuard<'_, ()> {
        self.entry.refresh_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn set_merges_and_clear_removes() {
        let s = Session::detached();
        s.set([(SessionKey::ACCESS_TOKEN, json!("a")), (SessionKey::USER, json!({"id": 1}))]).await;
        s.set([(SessionKey::REFRESH_TOKEN, json!("r"))]).await;
        assert_eq!(s.access_token().await.as_deref(), Some("a"));
        assert_eq!(s.refresh_token().await.as_deref(), Some("r"));
        s.clear(&[SessionKey::ACCESS_TOKEN]).await;
        assert_eq!(s.access_token().await, None);
        assert_eq!(s.user().await, Some(json!({"id": 1})));
    }

    #[tokio::test]
    async fn null_and_empty_values_read_as_absent() {
        let s = Session::detached();
        s.set([(SessionKey::ACCESS_TOKEN, json!(""))]).await;
        assert_eq!(s.access_token().await, None);
        s.set([(SessionKey::ACCESS_TOKEN, Value::Null)]).await;
        assert!(s.is_empty().await);
    }

    #[tokio::test]
    async fn tokens_are_read_together() {
        let s = Session::detached();
        assert_eq!(s.tokens().await, (None, None));
        s.set([(SessionKey::ACCESS_TOKEN, json!("a1")), (SessionKey::REFRESH_TOKEN, json!("r1"))]).await;
        assert_eq!(s.tokens().await, (Some("a1".to_string()), Some("r1".to_string())));
    }

    #[tokio::test]
    async fn untouched_new_session_is_not_stored() {
        let st = store();
        let s = st.load(None).await;
        assert_eq!(st.commit(&s).await, CommitOutcome::Untouched);
        assert!(!st.contains(s.id()).await);
    }

    #[tokio::test]
    async fn written_session_round_trips_through_the_store() {
        let st = store();
        let s = st.load(None).await;
        s.set([(SessionKey::ACCESS_TOKEN, json!("a"))]).await;
        assert_eq!(st.commit(&s).await, CommitOutcome::Created);

        let again = st.load(Some(s.id())).await;
        assert!(!again.is_new());
        assert_eq!(again.access_token().await.as_deref(), Some("a"));

        again.forget_auth().await;
        assert_eq!(st.commit(&again).await, CommitOutcome::Destroyed);
        assert!(!st.contains(s.id()).await);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let st = store();
        let a = st.load(None).await;
        a.set([(SessionKey::USER, json!("alice"))]).await;
        st.commit(&a).await;
        let b = st.load(None).await;
        assert_ne!(a.id(), b.id());
        assert_eq!(b.user().await, None);
    }

    #[tokio::test]
    async fn malformed_or_unknown_ids_get_a_fresh_session() {
        let st = store();
        let s = st.load(Some("not-a-uuid")).await;
        assert!(s.is_new());
        assert_ne!(s.id(), "not-a-uuid");
        let unknown = Uuid::new_v4().to_string();
        let s = st.load(Some(&unknown)).await;
        assert!(s.is_new());
        assert_ne!(s.id(), unknown);
    }
}
