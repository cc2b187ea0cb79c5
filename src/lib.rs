//! Streaming chat client core
//!
//! Turns an arbitrarily chunked response body into ordered text and tool
//! events, folds them into conversation state through a pure state machine,
//! and drives it all from a single runtime task.

pub mod clock;
pub mod config;
pub mod error;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod stream;
pub mod title_generator;
pub mod tool_activity;
