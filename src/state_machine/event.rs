//! Events that drive a response

use crate::error::TransportError;
use crate::stream::{StreamEvent, ToolEventKind};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Stream events
    TextDelta {
        text: String,
    },
    ToolStarted {
        name: String,
    },
    ToolFinished {
        name: String,
    },
    StreamEnded,

    // Failure
    TransportFailed {
        error: TransportError,
    },

    // Client events
    Cancelled {
        reason: CancelReason,
    },
}

/// Why a response was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user stopped the response
    User,
    /// The consumer is going away
    Teardown,
}

impl Event {
    /// Map a wire event to a state event.
    ///
    /// Returns `None` for records that never touch message state.
    pub fn from_stream(event: StreamEvent) -> Option<Self> {
        match event {
            StreamEvent::TextDelta(text) => Some(Event::TextDelta { text }),
            StreamEvent::Tool(tool) => Some(match tool.kind {
                ToolEventKind::Start => Event::ToolStarted { name: tool.name },
                ToolEventKind::End => Event::ToolFinished { name: tool.name },
            }),
            StreamEvent::ServerError(_) | StreamEvent::Finish(_) | StreamEvent::Unknown { .. } => {
                None
            }
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Event::TextDelta { text: text.into() }
    }
}
