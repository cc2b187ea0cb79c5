//! Conversation store
//!
//! Owns the conversation list and every message, and is the single place
//! where response events are folded into message state. Each event goes
//! through the pure [`transition`] function; the store applies the
//! resulting effects.
//!
//! At most one response is live per conversation. Events addressed to a
//! response that is no longer live (late bytes after a cancel, a stale
//! reader) are discarded, never applied.

use crate::clock::{Clock, SystemClock};
use crate::state_machine::{
    transition, CancelReason, Effect, Event, ResponseContext, ResponseState, StreamState,
    TransitionError,
};
use crate::title_generator::{self, DEFAULT_TITLE};
use crate::tool_activity::{ToolActivity, ToolActivityTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("A response is already streaming in conversation {0}")]
    StreamInFlight(String),
    #[error("Conversation not found: {0}")]
    UnknownConversation(String),
    #[error("Message not found: {0}")]
    UnknownMessage(String),
    #[error("Feedback only applies to assistant messages")]
    NotAssistantMessage,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Title is empty")]
    EmptyTitle,
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Messages and conversations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Up and down are mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Seconds from request to first token, set at most once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    /// Lifecycle of an assistant response; `None` for user messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseState>,
}

impl Message {
    fn user(text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: text.to_string(),
            thinking_time: None,
            feedback: None,
            response: None,
        }
    }

    fn assistant_placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: String::new(),
            thinking_time: None,
            feedback: None,
            response: Some(ResponseState::Pending),
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.response, Some(ResponseState::Error { .. }))
    }
}

/// Where the current title came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSource {
    Placeholder,
    Derived,
    /// Renamed by the user; never overwritten
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Backend thread id
    pub id: String,
    pub title: String,
    pub title_source: TitleSource,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Body of the streaming chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl ChatRequest {
    /// Prior turns with content; failed responses carry only the apology
    /// text and are left out.
    fn from_history(messages: &[Message]) -> Self {
        Self {
            messages: messages
                .iter()
                .filter(|m| !m.content.is_empty() && !m.is_failed())
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
        }
    }
}

/// Result of a successful submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub conversation_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
    /// The conversation did not exist before this submit
    pub conversation_created: bool,
    pub request: ChatRequest,
}

/// What applying an event did
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Addressed to a response that is not live; state untouched
    Discarded,
    Updated { effects: Vec<Effect> },
}

impl Applied {
    pub fn effects(&self) -> &[Effect] {
        match self {
            Applied::Discarded => &[],
            Applied::Updated { effects } => effects,
        }
    }

    pub fn ended(&self) -> Option<&ResponseState> {
        self.effects().iter().find_map(|e| match e {
            Effect::ResponseEnded { outcome } => Some(outcome),
            _ => None,
        })
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug)]
struct LiveResponse {
    message_id: String,
    state: ResponseState,
    stream: StreamState,
}

pub struct ConversationStore {
    /// Most recent first
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    live: HashMap<String, LiveResponse>,
    tool_activity: ToolActivityTracker,
    clock: Arc<dyn Clock>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ConversationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations: Vec::new(),
            messages: HashMap::new(),
            live: HashMap::new(),
            tool_activity: ToolActivityTracker::default(),
            clock,
        }
    }

    // ==================== Conversation Operations ====================

    /// Insert a conversation with the placeholder title if it is new.
    /// Returns whether it was inserted.
    pub fn add_conversation(&mut self, thread_id: &str) -> bool {
        if self.conversation(thread_id).is_some() {
            return false;
        }
        self.conversations.insert(
            0,
            Conversation {
                id: thread_id.to_string(),
                title: DEFAULT_TITLE.to_string(),
                title_source: TitleSource::Placeholder,
                created_at: Utc::now(),
            },
        );
        tracing::debug!(conversation_id = %thread_id, "Conversation added");
        true
    }

    pub fn rename(&mut self, thread_id: &str, title: &str) -> StoreResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        let conv = self.conversation_mut(thread_id)?;
        conv.title = title.to_string();
        conv.title_source = TitleSource::User;
        Ok(())
    }

    /// Remove a conversation and its messages. Refused while streaming.
    pub fn remove_conversation(&mut self, thread_id: &str) -> StoreResult<()> {
        if self.live.contains_key(thread_id) {
            return Err(StoreError::StreamInFlight(thread_id.to_string()));
        }
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != thread_id);
        if self.conversations.len() == before {
            return Err(StoreError::UnknownConversation(thread_id.to_string()));
        }
        self.messages.remove(thread_id);
        Ok(())
    }

    /// Whether the title is still the placeholder
    pub fn needs_title(&self, thread_id: &str) -> bool {
        self.conversation(thread_id)
            .is_some_and(|c| c.title_source == TitleSource::Placeholder)
    }

    /// Derive the title from the thread's first message.
    ///
    /// Returns the new title if it changed. A user rename always wins.
    pub fn apply_title(&mut self, thread_id: &str, first_message: &str) -> Option<String> {
        let derived = title_generator::title(first_message);
        let conv = self.conversation_mut(thread_id).ok()?;
        if conv.title_source == TitleSource::User {
            return None;
        }
        conv.title_source = TitleSource::Derived;
        if conv.title == derived {
            return None;
        }
        conv.title.clone_from(&derived);
        Some(derived)
    }

    // ==================== Response Operations ====================

    /// Record the user's message and open a placeholder response
    pub fn submit(&mut self, conversation_id: &str, text: &str) -> StoreResult<Submission> {
        if text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        if self.live.contains_key(conversation_id) {
            return Err(StoreError::StreamInFlight(conversation_id.to_string()));
        }

        let conversation_created = self.add_conversation(conversation_id);

        let user = Message::user(text);
        let assistant = Message::assistant_placeholder();
        let user_message_id = user.id.clone();
        let assistant_message_id = assistant.id.clone();

        let thread = self.messages.entry(conversation_id.to_string()).or_default();
        thread.push(user);
        let request = ChatRequest::from_history(thread);
        thread.push(assistant);

        self.live.insert(
            conversation_id.to_string(),
            LiveResponse {
                message_id: assistant_message_id.clone(),
                state: ResponseState::Pending,
                stream: StreamState::started(self.clock.now()),
            },
        );

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %assistant_message_id,
            history = request.messages.len(),
            "Response requested"
        );

        Ok(Submission {
            conversation_id: conversation_id.to_string(),
            user_message_id,
            assistant_message_id,
            conversation_created,
            request,
        })
    }

    /// Fold one event into the addressed response
    pub fn apply(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        event: Event,
    ) -> StoreResult<Applied> {
        let Some(live) = self
            .live
            .get(conversation_id)
            .filter(|l| l.message_id == message_id)
        else {
            tracing::trace!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                "Discarding event for response that is not live"
            );
            return Ok(Applied::Discarded);
        };

        let now = self.clock.now();
        let context = ResponseContext::new(conversation_id, message_id, now);
        let result = match transition(&live.state, &live.stream, &context, event) {
            Ok(r) => r,
            Err(TransitionError::AlreadyTerminal(state)) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    state = state.name(),
                    "Discarding event after terminal state"
                );
                return Ok(Applied::Discarded);
            }
        };

        let message = self
            .messages
            .get_mut(conversation_id)
            .and_then(|thread| thread.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| StoreError::UnknownMessage(message_id.to_string()))?;

        message.response = Some(result.new_state.clone());
        for effect in &result.effects {
            match effect {
                Effect::AppendContent { text } => message.content.push_str(text),
                Effect::SetThinkingTime { seconds } => {
                    if message.thinking_time.is_none() {
                        tracing::info!(
                            conversation_id = %conversation_id,
                            thinking_time = seconds,
                            "First token"
                        );
                        message.thinking_time = Some(*seconds);
                    }
                }
                Effect::ReplaceContent { text } => message.content.clone_from(text),
                Effect::ToolActive { name } => {
                    tracing::debug!(conversation_id = %conversation_id, tool = %name, "Tool started");
                }
                Effect::ToolCleared { name, completed } => {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        tool = %name,
                        completed,
                        "Tool cleared"
                    );
                    if *completed {
                        self.tool_activity.record_completion(conversation_id, name, now);
                    }
                }
                Effect::ResponseEnded { outcome } => {
                    tracing::info!(
                        conversation_id = %conversation_id,
                        message_id = %message_id,
                        state = outcome.name(),
                        chars = result.stream.received_chars,
                        "Response ended"
                    );
                }
            }
        }

        if result.new_state.is_terminal() {
            self.live.remove(conversation_id);
        } else if let Some(live) = self.live.get_mut(conversation_id) {
            live.state = result.new_state;
            live.stream = result.stream;
        }

        Ok(Applied::Updated {
            effects: result.effects,
        })
    }

    /// Freeze the live response, if any. Cancelling twice, or after the
    /// response ended, is a no-op.
    pub fn cancel(&mut self, conversation_id: &str, reason: CancelReason) -> StoreResult<Applied> {
        let Some(message_id) = self.live_message_id(conversation_id).map(str::to_string) else {
            return Ok(Applied::Discarded);
        };
        self.apply(conversation_id, &message_id, Event::Cancelled { reason })
    }

    /// Toggle feedback on an assistant message. Returns the resulting value.
    pub fn set_feedback(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        feedback: Feedback,
    ) -> StoreResult<Option<Feedback>> {
        let message = self
            .messages
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::UnknownConversation(conversation_id.to_string()))?
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::UnknownMessage(message_id.to_string()))?;

        if message.role != Role::Assistant {
            return Err(StoreError::NotAssistantMessage);
        }
        message.feedback = if message.feedback == Some(feedback) {
            None
        } else {
            Some(feedback)
        };
        Ok(message.feedback)
    }

    // ==================== Reads ====================

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, thread_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == thread_id)
    }

    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.messages
            .get(conversation_id)
            .map_or(&[], Vec::as_slice)
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&Message> {
        self.messages(conversation_id)
            .iter()
            .find(|m| m.id == message_id)
    }

    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        self.live.contains_key(conversation_id)
    }

    pub fn live_message_id(&self, conversation_id: &str) -> Option<&str> {
        self.live
            .get(conversation_id)
            .map(|l| l.message_id.as_str())
    }

    /// Conversations with a response in flight
    pub fn live_conversations(&self) -> Vec<String> {
        self.live.keys().cloned().collect()
    }

    pub fn active_tool(&self, conversation_id: &str) -> Option<&str> {
        self.live
            .get(conversation_id)
            .and_then(|l| l.stream.active_tool.as_deref())
    }

    pub fn tool_activity(&self, conversation_id: &str) -> ToolActivity {
        self.tool_activity.activity(
            conversation_id,
            self.active_tool(conversation_id),
            self.clock.now(),
        )
    }

    fn conversation_mut(&mut self, thread_id: &str) -> StoreResult<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == thread_id)
            .ok_or_else(|| StoreError::UnknownConversation(thread_id.to_string()))
    }
}
