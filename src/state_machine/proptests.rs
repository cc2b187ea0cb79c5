//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible event sequences.

use super::*;
use crate::error::TransportError;
use proptest::prelude::*;
use std::time::{Duration, Instant};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("file_search".to_string()),
        Just("web_search".to_string()),
        "[a-z_]{1,12}",
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        6 => "[a-zA-Z0-9 é]{0,10}".prop_map(Event::text),
        2 => arb_tool_name().prop_map(|name| Event::ToolStarted { name }),
        2 => arb_tool_name().prop_map(|name| Event::ToolFinished { name }),
        1 => Just(Event::StreamEnded),
        1 => "[a-z ]{1,20}".prop_map(|m| Event::TransportFailed {
            error: TransportError::network(m),
        }),
        1 => prop_oneof![Just(CancelReason::User), Just(CancelReason::Teardown)]
            .prop_map(|reason| Event::Cancelled { reason }),
    ]
}

/// Events paired with a millisecond gap before each
fn arb_timeline() -> impl Strategy<Value = Vec<(u64, Event)>> {
    proptest::collection::vec((0u64..2_000, arb_event()), 0..40)
}

/// Fold a timeline, returning every accepted transition in order
fn run(timeline: Vec<(u64, Event)>) -> Vec<(ResponseState, TransitionResult)> {
    let start = Instant::now();
    let mut now = start;
    let mut state = ResponseState::Pending;
    let mut stream = StreamState::started(start);
    let mut accepted = Vec::new();

    for (gap, event) in timeline {
        now += Duration::from_millis(gap);
        let ctx = ResponseContext::new("conv", "msg", now);
        if let Ok(result) = transition(&state, &stream, &ctx, event) {
            state = result.new_state.clone();
            stream = result.stream.clone();
            accepted.push((state.clone(), result));
        }
    }
    accepted
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_thinking_time_set_at_most_once(timeline in arb_timeline()) {
        let count = run(timeline)
            .iter()
            .flat_map(|(_, r)| r.effects.iter())
            .filter(|e| matches!(e, Effect::SetThinkingTime { .. }))
            .count();
        prop_assert!(count <= 1);
    }

    #[test]
    fn prop_thinking_time_on_first_nonempty_delta(timeline in arb_timeline()) {
        let first_append = run(timeline)
            .into_iter()
            .map(|(_, r)| r.effects)
            .find(|effects| effects.iter().any(|e| matches!(e, Effect::AppendContent { .. })));

        if let Some(effects) = first_append {
            let timing = effects.iter().position(|e| matches!(e, Effect::SetThinkingTime { .. }));
            let append = effects.iter().position(|e| matches!(e, Effect::AppendContent { .. }));
            prop_assert!(timing.is_some());
            prop_assert!(timing < append);
        }
    }

    #[test]
    fn prop_nothing_after_terminal(timeline in arb_timeline()) {
        let accepted = run(timeline);
        if let Some(idx) = accepted.iter().position(|(s, _)| s.is_terminal()) {
            prop_assert_eq!(idx, accepted.len() - 1);
        }
    }

    #[test]
    fn prop_received_chars_monotonic(timeline in arb_timeline()) {
        let mut last = 0;
        for (_, result) in run(timeline) {
            prop_assert!(result.stream.received_chars >= last);
            last = result.stream.received_chars;
        }
    }

    #[test]
    fn prop_terminal_clears_tool_and_timing(timeline in arb_timeline()) {
        for (state, result) in run(timeline) {
            if state.is_terminal() {
                prop_assert_eq!(result.stream.active_tool, None);
                prop_assert_eq!(result.stream.request_started_at, None);
                let ended_last = matches!(result.effects.last(), Some(Effect::ResponseEnded { .. }));
                prop_assert!(ended_last);
            }
        }
    }

    #[test]
    fn prop_never_returns_to_pending(timeline in arb_timeline()) {
        let mut left_pending = false;
        for (state, _) in run(timeline) {
            if state == ResponseState::Pending {
                prop_assert!(!left_pending);
            } else {
                left_pending = true;
            }
        }
    }

    #[test]
    fn prop_only_failures_replace_content(timeline in arb_timeline()) {
        for (state, result) in run(timeline) {
            let replaced = result.effects.iter().any(|e| matches!(e, Effect::ReplaceContent { .. }));
            let failed = matches!(state, ResponseState::Error { .. });
            prop_assert_eq!(replaced, failed);
        }
    }
}
