//! Property-based tests for the dialogue loop
//!
//! The transition function is driven with arbitrary event sequences while a
//! real [`Conversation`] absorbs the append effects, so transcript
//! invariants are checked against the same type the executor writes to.

use super::transition::{start, transition};
use super::*;
use crate::conversation::{Conversation, ToolCall, Turn};
use crate::llm::{LlmErrorKind, LlmResponse};
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

/// One step of a generated exchange. Steps are turned into events relative
/// to the current state, so most of them are applicable.
#[derive(Debug, Clone)]
enum Step {
    Answer(Option<String>),
    Call(usize),
    DuplicateCall,
    Fail(LlmErrorKind),
    Timeout,
    Cancel,
    ToolsOk,
    ToolsUnknown,
    ToolsMismatched,
}

fn apply(conv: &mut Conversation, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::AppendTurn { turn } => conv.append(turn.clone()),
            Effect::AppendToolResults { results } => {
                conv.extend(results.iter().cloned().map(ToolResult::into_turn));
            }
            _ => {}
        }
    }
}

fn calls(next_id: &mut usize, count: usize) -> Vec<ToolCall> {
    (0..count)
        .map(|_| {
            *next_id += 1;
            ToolCall::new(format!("call_{next_id}"), "fn_retrieve", "{}")
        })
        .collect()
}

fn event_for(step: &Step, state: &LoopState, next_id: &mut usize) -> Event {
    let pending: &[ToolCall] = match state {
        LoopState::ExecutingTools { pending, .. } => pending,
        _ => &[],
    };
    match step {
        Step::Answer(text) => Event::CompletionReceived {
            response: LlmResponse {
                text: text.clone(),
                ..LlmResponse::default()
            },
        },
        Step::Call(n) => Event::CompletionReceived {
            response: LlmResponse::requesting(calls(next_id, *n)),
        },
        Step::DuplicateCall => {
            let call = ToolCall::new("dup", "fn_retrieve", "{}");
            Event::CompletionReceived {
                response: LlmResponse::requesting(vec![call.clone(), call]),
            }
        }
        Step::Fail(kind) => Event::CompletionFailed {
            kind: *kind,
            message: "boom".to_string(),
        },
        Step::Timeout => Event::CompletionTimedOut {
            after: Duration::from_secs(1),
        },
        Step::Cancel => Event::Cancelled,
        Step::ToolsOk => Event::ToolsCompleted {
            results: pending
                .iter()
                .map(|c| ToolResult::success(c.id.clone(), serde_json::json!({"chunks": []})))
                .collect(),
        },
        Step::ToolsUnknown => Event::ToolResolutionFailed {
            name: "fn_unknown".to_string(),
        },
        Step::ToolsMismatched => Event::ToolsCompleted {
            results: pending
                .iter()
                .rev()
                .map(|c| ToolResult::error(c.id.clone(), "x"))
                .chain(std::iter::once(ToolResult::error("stray", "x")))
                .collect(),
        },
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => proptest::option::of("[a-zA-Z ]{0,20}").prop_map(Step::Answer),
        4 => (1usize..4).prop_map(Step::Call),
        1 => Just(Step::DuplicateCall),
        1 => arb_error_kind().prop_map(Step::Fail),
        1 => Just(Step::Timeout),
        1 => Just(Step::Cancel),
        4 => Just(Step::ToolsOk),
        1 => Just(Step::ToolsUnknown),
        1 => Just(Step::ToolsMismatched),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = LoopState> {
    prop_oneof![
        "[a-zA-Z ]{1,20}".prop_map(|answer| LoopState::Done { answer }),
        Just(LoopState::Failed {
            error: DialogueError::Cancelled
        }),
        (1u32..20).prop_map(|max| LoopState::Failed {
            error: DialogueError::LoopBudgetExceeded { max }
        }),
    ]
}

fn small_config(max_round_trips: u32) -> LoopConfig {
    LoopConfig {
        max_round_trips,
        ..LoopConfig::default()
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Whenever the loop is about to call the model, or has stopped, every
    // tool call in the transcript has its result
    #[test]
    fn prop_transcript_stays_sendable(
        steps in proptest::collection::vec(arb_step(), 0..30),
        max in 1u32..5,
    ) {
        let config = small_config(max);
        let mut conv = Conversation::new("system");
        let started = start("question");
        apply(&mut conv, &started.effects);
        let mut state = started.new_state;
        let mut next_id = 0;

        for step in &steps {
            let event = event_for(step, &state, &mut next_id);
            let Ok(result) = transition(&state, &config, event) else {
                continue;
            };
            apply(&mut conv, &result.effects);
            state = result.new_state;

            match &state {
                LoopState::ExecutingTools { pending, .. } => {
                    let ids: Vec<String> = pending.iter().map(|c| c.id.clone()).collect();
                    prop_assert_eq!(conv.unresolved_invocations(), ids);
                }
                _ => prop_assert!(
                    conv.snapshot().is_ok(),
                    "unsendable transcript in {}", state.name()
                ),
            }
        }
    }

    // A single transition never asks for both a completion and tool work,
    // and a terminal state asks for neither
    #[test]
    fn prop_effects_match_state(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let config = small_config(3);
        let mut state = start("question").new_state;
        let mut next_id = 0;

        for step in &steps {
            let event = event_for(step, &state, &mut next_id);
            let Ok(result) = transition(&state, &config, event) else {
                continue;
            };
            let requests = result.effects.iter().filter(|e| matches!(e, Effect::RequestCompletion)).count();
            let executes = result.effects.iter().filter(|e| matches!(e, Effect::ExecuteTools { .. })).count();
            prop_assert!(requests + executes <= 1);
            if result.new_state.is_terminal() {
                prop_assert_eq!(requests + executes, 0);
            }
            state = result.new_state;
        }
    }

    #[test]
    fn prop_terminal_states_reject_events(
        state in arb_terminal_state(),
        step in arb_step(),
    ) {
        let mut next_id = 0;
        let event = event_for(&step, &state, &mut next_id);
        let result = transition(&state, &LoopConfig::default(), event);
        prop_assert!(matches!(result, Err(TransitionError::Terminal(_))));
    }

    // With a model that always asks for tools, the exchange fails after
    // exactly max + 1 completions
    #[test]
    fn prop_budget_counts_completions(max in 1u32..8, width in 1usize..4) {
        let config = small_config(max);
        let mut state = start("question").new_state;
        let mut next_id = 0;
        let mut completions = 0;

        while !state.is_terminal() {
            let step = match state {
                LoopState::AwaitingCompletion { .. } => {
                    completions += 1;
                    Step::Call(width)
                }
                _ => Step::ToolsOk,
            };
            let event = event_for(&step, &state, &mut next_id);
            state = transition(&state, &config, event).unwrap().new_state;
        }

        prop_assert_eq!(completions, max + 1);
        prop_assert_eq!(state, LoopState::Failed {
            error: DialogueError::LoopBudgetExceeded { max }
        });
    }

    // Cancelling during tool work answers each pending call once, in order
    #[test]
    fn prop_cancel_answers_each_pending_call(width in 1usize..6) {
        let config = LoopConfig::default();
        let mut next_id = 0;
        let pending = calls(&mut next_id, width);
        let state = LoopState::ExecutingTools { round_trip: 1, pending: pending.clone() };

        let result = transition(&state, &config, Event::Cancelled).unwrap();
        prop_assert_eq!(&result.new_state, &LoopState::Failed { error: DialogueError::Cancelled });

        let appended: Vec<&ToolResult> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::AppendToolResults { results } => Some(results),
                _ => None,
            })
            .flatten()
            .collect();
        prop_assert_eq!(appended.len(), width);
        for (result, call) in appended.iter().zip(&pending) {
            prop_assert_eq!(&result.tool_call_id, &call.id);
            prop_assert!(result.is_error);
        }
    }

    // Snapshot returns the system turn followed by the appended turns in order
    #[test]
    fn prop_snapshot_preserves_order(
        texts in proptest::collection::vec(("[a-zA-Z ]{1,20}", any::<bool>()), 0..20),
    ) {
        let mut conv = Conversation::new("system");
        let turns: Vec<Turn> = texts
            .iter()
            .map(|(text, from_user)| {
                if *from_user {
                    Turn::user(text.as_str())
                } else {
                    Turn::assistant(Some(text.clone()), vec![])
                }
            })
            .collect();
        conv.extend(turns.clone());

        let snapshot = conv.snapshot().unwrap();
        prop_assert_eq!(snapshot.len(), turns.len() + 1);
        prop_assert_eq!(snapshot.system_prompt(), Some("system"));
        prop_assert_eq!(&snapshot.turns()[1..], turns.as_slice());
    }
}
