//! Pure state transition function
//!
//! Given the same state, stream bookkeeping, context and event, this always
//! produces the same result and performs no I/O. Applying the effects is
//! the store's job.

use super::state::FAILURE_MESSAGE;
use super::{CancelReason, Effect, Event, ResponseContext, ResponseState, StreamState};
use std::time::Instant;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ResponseState,
    pub stream: StreamState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ResponseState, stream: StreamState) -> Self {
        Self {
            new_state: state,
            stream,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Late bytes, a second cancel, a cancel after completion. The caller
    /// discards the event.
    #[error("Response already ended ({})", .0.name())]
    AlreadyTerminal(ResponseState),
}

/// Pure transition function
pub fn transition(
    state: &ResponseState,
    stream: &StreamState,
    context: &ResponseContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(state.clone()));
    }

    let mut stream = stream.clone();

    match event {
        // ============================================================
        // Text
        // ============================================================
        Event::TextDelta { text } => {
            let mut effects = Vec::new();

            // First output supersedes the "tool running" indicator
            if let Some(name) = stream.active_tool.take() {
                effects.push(Effect::tool_finished(name));
            }

            if !text.is_empty() {
                if let Some(started) = stream.request_started_at.take() {
                    effects.push(Effect::SetThinkingTime {
                        seconds: thinking_time(started, context.now),
                    });
                }
                stream.received_chars += text.chars().count();
                effects.push(Effect::append(text));
            }

            let new_state = if *state == ResponseState::Streaming || stream.received_chars > 0 {
                ResponseState::Streaming
            } else {
                state.clone()
            };

            Ok(TransitionResult::new(new_state, stream).with_effects(effects))
        }

        // ============================================================
        // Tools
        // ============================================================
        Event::ToolStarted { name } => {
            stream.active_tool = Some(name.clone());
            Ok(TransitionResult::new(ResponseState::Streaming, stream)
                .with_effect(Effect::ToolActive { name }))
        }

        Event::ToolFinished { name } => {
            stream.active_tool = None;
            Ok(TransitionResult::new(state.clone(), stream).with_effect(Effect::tool_finished(name)))
        }

        // ============================================================
        // Terminal transitions
        // ============================================================
        Event::StreamEnded => Ok(end(ResponseState::Complete, stream, vec![])),

        Event::TransportFailed { error } => Ok(end(
            ResponseState::Error {
                message: error.message,
            },
            stream,
            vec![Effect::ReplaceContent {
                text: FAILURE_MESSAGE.to_string(),
            }],
        )),

        Event::Cancelled { reason } => {
            tracing::debug!(
                conversation_id = %context.conversation_id,
                message_id = %context.message_id,
                teardown = reason == CancelReason::Teardown,
                "Freezing response at partial content"
            );
            Ok(end(ResponseState::CompletePartial, stream, vec![]))
        }
    }
}

/// Clear tool and timing, then emit the terminal effect last
fn end(outcome: ResponseState, mut stream: StreamState, effects: Vec<Effect>) -> TransitionResult {
    let abandoned = stream.active_tool.take().map(Effect::tool_abandoned);
    stream.request_started_at = None;

    TransitionResult::new(outcome.clone(), stream)
        .with_effects(abandoned)
        .with_effects(effects)
        .with_effect(Effect::ended(outcome))
}

/// Seconds to first token, rounded to one decimal place
pub fn thinking_time(started: Instant, now: Instant) -> f64 {
    let elapsed = now.saturating_duration_since(started);
    (elapsed.as_secs_f64() * 10.0).round() / 10.0
}
