//! Per-session client identity
//!
//! A session token correlates ancillary requests (title lookup) with the
//! client that started the conversation. It is generated once and reused
//! for as long as the backing store lives.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage key under which the token is kept
pub const SESSION_KEY: &str = "chatSessionId";

const RANDOM_SUFFIX_LEN: usize = 9;

/// Session-scoped key/value storage
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

/// Process-lifetime store; a process is one session
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_string(), value);
    }
}

/// Return the session token, creating and persisting one on first use
pub fn get_or_create_session_id(store: &dyn SessionStore) -> String {
    if let Some(existing) = store.get(SESSION_KEY).filter(|s| !s.is_empty()) {
        return existing;
    }

    let sid = generate_session_id();
    tracing::debug!(session_id = %sid, "Created session id");
    store.set(SESSION_KEY, sid.clone());
    sid
}

/// `<millis since epoch>_<9 lowercase alphanumerics>`
fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{millis}_{suffix}")
}
