//! Response lifecycle types

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Shown in place of the partial answer when the transport fails
pub const FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while getting a response. Please try again.";

// ============================================================================
// Response State
// ============================================================================

/// Lifecycle of one assistant message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
#[derive(Default)]
pub enum ResponseState {
    /// Placeholder created, nothing received yet
    #[default]
    Pending,

    /// Content is arriving or a tool is running
    Streaming,

    /// Stream ended normally (terminal)
    Complete,

    /// Cancelled before the stream ended; content frozen as received (terminal)
    CompletePartial,

    /// Transport failed; content replaced by [`FAILURE_MESSAGE`] (terminal)
    Error { message: String },
}

impl ResponseState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseState::Complete | ResponseState::CompletePartial | ResponseState::Error { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseState::Pending => "pending",
            ResponseState::Streaming => "streaming",
            ResponseState::Complete => "complete",
            ResponseState::CompletePartial => "complete_partial",
            ResponseState::Error { .. } => "error",
        }
    }
}

// ============================================================================
// Stream State
// ============================================================================

/// Bookkeeping for one in-flight response.
///
/// The accumulated text itself lives on the message; this only tracks how
/// much of it has arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Cleared once thinking time has been measured, so it is measured once
    pub request_started_at: Option<Instant>,
    /// Tool currently running server-side
    pub active_tool: Option<String>,
    /// Characters appended so far; never decreases
    pub received_chars: usize,
}

impl StreamState {
    pub fn started(at: Instant) -> Self {
        Self {
            request_started_at: Some(at),
            ..Self::default()
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Per-transition context (immutable)
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub conversation_id: String,
    pub message_id: String,
    /// When the event is being applied
    pub now: Instant,
}

impl ResponseContext {
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        now: Instant,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            now,
        }
    }
}
