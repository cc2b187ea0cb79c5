//! Effects produced by state transitions

use super::ResponseState;

/// Message mutations and notifications to carry out after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a fragment to the message content
    AppendContent { text: String },

    /// Freeze the time to first token on the message, in seconds
    SetThinkingTime { seconds: f64 },

    /// Overwrite the message content
    ReplaceContent { text: String },

    /// A tool began running
    ToolActive { name: String },

    /// The tool indicator went away. `completed` is false when it was
    /// cleared by the response ending rather than by the tool finishing.
    ToolCleared { name: String, completed: bool },

    /// The response reached a terminal state
    ResponseEnded { outcome: ResponseState },
}

impl Effect {
    pub fn append(text: impl Into<String>) -> Self {
        Effect::AppendContent { text: text.into() }
    }

    pub fn tool_finished(name: impl Into<String>) -> Self {
        Effect::ToolCleared {
            name: name.into(),
            completed: true,
        }
    }

    pub fn tool_abandoned(name: impl Into<String>) -> Self {
        Effect::ToolCleared {
            name: name.into(),
            completed: false,
        }
    }

    pub fn ended(outcome: ResponseState) -> Self {
        Effect::ResponseEnded { outcome }
    }
}
