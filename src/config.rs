//! Client configuration

use reqwest::Url;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8000/";
const DEFAULT_CHAT_PATH: &str = "api/chat";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the streaming client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, always ending in `/`
    pub api_base: String,
    /// Path of the streaming chat endpoint relative to `api_base`
    pub chat_path: String,
    /// Applies to connection setup only. A stalled body is left to the caller.
    pub connect_timeout: Duration,
    /// Conversation to resume; a fresh one is started when unset
    pub conversation_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            conversation_id: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("CHATSTREAM_API_BASE")
                .map_or(defaults.api_base, |base| normalize_base(&base)),
            chat_path: std::env::var("CHATSTREAM_CHAT_PATH")
                .map_or(defaults.chat_path, |p| p.trim_start_matches('/').to_string()),
            connect_timeout: std::env::var("CHATSTREAM_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.connect_timeout, Duration::from_secs),
            conversation_id: std::env::var("CHATSTREAM_CONVERSATION_ID")
                .ok()
                .filter(|id| !id.trim().is_empty()),
        }
    }

    /// Build a config pointing at an explicit base URL
    pub fn with_base(base: &str) -> Self {
        Self {
            api_base: normalize_base(base),
            ..Self::default()
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.api_base, self.chat_path)
    }

    /// `GET {base}first-message/{threadId}?sid={sessionId}`
    ///
    /// The thread id is a single percent-encoded path segment. `None` when
    /// the base is not a usable URL.
    pub fn first_message_url(&self, thread_id: &str) -> Option<Url> {
        let mut url = Url::parse(&self.api_base).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("first-message")
            .push(thread_id);
        Some(url)
    }
}

fn normalize_base(base: &str) -> String {
    format!("{}/", base.trim_end_matches('/'))
}
