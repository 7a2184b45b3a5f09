//! Per-request session handle and the store behind it.
//!
//! A [`Session`] is created by the `session` middleware, lives for exactly one
//! request, and is the only way request code touches session data. Values are
//! JSON so middleware and controllers can share typed data without a schema.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

/// Session keys shared between the built-in middleware and application code.
pub mod keys {
    /// Id of the logged-in user, checked by the `auth` middleware.
    pub const AUTH_USER_ID: &str = "auth_user_id";
    pub const ADMIN_AUTHENTICATED: &str = "admin_authenticated";
    /// Unix timestamp (seconds) of the last admin request.
    pub const ADMIN_LAST_ACTIVITY: &str = "admin_last_activity";
    /// Client IP the admin session is pinned to.
    pub const ADMIN_IP: &str = "admin_ip";
    pub const CSRF_TOKEN: &str = "csrf_token";
}

/// Backing storage for session data, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn load(&self, id: &str) -> Option<HashMap<String, Value>>;
    async fn save(&self, id: &str, values: HashMap<String, Value>);
    async fn destroy(&self, id: &str);
}

/// Process-local [`SessionStore`]. Sessions vanish on restart.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Value>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, id: &str) -> Option<HashMap<String, Value>> {
        self.sessions().get(id).cloned()
    }

    async fn save(&self, id: &str, values: HashMap<String, Value>) {
        self.sessions().insert(id.to_owned(), values);
    }

    async fn destroy(&self, id: &str) {
        self.sessions().remove(id);
    }
}

#[derive(Debug, Default)]
struct State {
    id: String,
    values: HashMap<String, Value>,
    previous_id: Option<String>,
    dirty: bool,
}

/// Session data for the current request.
///
/// Cheap to clone: clones share the same underlying state, so a middleware
/// that keeps a handle sees whatever the controller wrote.
#[derive(Clone, Debug, Default)]
pub struct Session {
    state: Arc<Mutex<State>>,
}

impl Session {
    /// A session with the given id and existing values.
    pub fn new(id: impl Into<String>, values: HashMap<String, Value>) -> Self {
        let state = State { id: id.into(), values, ..State::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.state().id.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state().values.get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.state();
        state.values.insert(key.into(), value.into());
        state.dirty = true;
    }

    pub fn forget(&self, key: &str) {
        let mut state = self.state();
        if state.values.remove(key).is_some() {
            state.dirty = true;
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.state().values.contains_key(key)
    }

    pub fn all(&self) -> HashMap<String, Value> {
        self.state().values.clone()
    }

    pub fn flush(&self) {
        let mut state = self.state();
        state.values.clear();
        state.dirty = true;
    }

    /// Moves the data to a fresh id. The old id is destroyed when the session
    /// is persisted.
    pub fn regenerate(&self) {
        let mut state = self.state();
        let fresh = uuid::Uuid::new_v4().to_string();
        let old = std::mem::replace(&mut state.id, fresh);
        state.previous_id.get_or_insert(old);
        state.dirty = true;
    }

    /// Whether anything was written since the session was loaded.
    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }

    pub(crate) fn take_previous_id(&self) -> Option<String> {
        self.state().previous_id.take()
    }
}
