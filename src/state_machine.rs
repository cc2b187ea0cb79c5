//! Per-response state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{CancelReason, Event};
pub use state::{ResponseContext, ResponseState, StreamState, FAILURE_MESSAGE};
pub use transition::{thinking_time, transition, TransitionError, TransitionResult};
