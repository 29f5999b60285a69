//! Pure state transition function
//!
//! Given the same state, limits and event, `transition` always produces the
//! same new state and effects. It performs no I/O.

use super::state::FALLBACK_ANSWER;
use super::{DialogueError, Effect, Event, LoopConfig, LoopState, ToolResult};
use crate::conversation::{ToolCall, Turn};
use std::collections::HashSet;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: LoopState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: LoopState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("exchange already finished in state {0}")]
    Terminal(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Begin an exchange: append the user turn and ask for the first completion
pub fn start(text: &str) -> TransitionResult {
    let state = LoopState::AwaitingCompletion { round_trip: 1 };
    TransitionResult::new(state)
        .with_effect(Effect::AppendTurn {
            turn: Turn::user(text),
        })
        .with_effect(Effect::notify_state("awaiting_completion"))
        .with_effect(Effect::RequestCompletion)
}

fn fail(error: DialogueError) -> TransitionResult {
    let message = error.to_string();
    TransitionResult::new(LoopState::Failed { error }).with_effect(Effect::notify_failed(message))
}

/// Fail out of `ExecutingTools`, answering every pending call so the
/// transcript stays sendable
fn fail_with_synthetic_results(
    pending: &[ToolCall],
    reason: &str,
    error: DialogueError,
) -> TransitionResult {
    let results = pending
        .iter()
        .map(|call| ToolResult::error(call.id.clone(), reason))
        .collect();
    let message = error.to_string();
    TransitionResult::new(LoopState::Failed { error })
        .with_effect(Effect::AppendToolResults { results })
        .with_effect(Effect::notify_failed(message))
}

fn first_duplicate_id(calls: &[ToolCall]) -> Option<&str> {
    let mut seen = HashSet::new();
    calls
        .iter()
        .find(|c| !seen.insert(c.id.as_str()))
        .map(|c| c.id.as_str())
}

pub fn transition(
    state: &LoopState,
    config: &LoopConfig,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (LoopState::Done { .. } | LoopState::Failed { .. }, _) => {
            Err(TransitionError::Terminal(state.name()))
        }

        // ============================================================
        // Completion handling
        // ============================================================

        (LoopState::AwaitingCompletion { round_trip }, Event::CompletionReceived { response }) => {
            if !response.has_tool_calls() {
                let answer = response
                    .text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
                return Ok(TransitionResult::new(LoopState::Done {
                    answer: answer.clone(),
                })
                .with_effect(Effect::AppendTurn {
                    turn: Turn::assistant(Some(answer.clone()), vec![]),
                })
                .with_effect(Effect::notify_done(&answer)));
            }

            if let Some(id) = first_duplicate_id(&response.tool_calls) {
                return Ok(fail(DialogueError::DuplicateInvocation { id: id.to_string() }));
            }

            if *round_trip > config.max_round_trips {
                return Ok(fail(DialogueError::LoopBudgetExceeded {
                    max: config.max_round_trips,
                }));
            }

            let calls = response.tool_calls;
            Ok(TransitionResult::new(LoopState::ExecutingTools {
                round_trip: *round_trip,
                pending: calls.clone(),
            })
            .with_effect(Effect::AppendTurn {
                turn: Turn::assistant(response.text, calls.clone()),
            })
            .with_effect(Effect::notify_state("executing_tools"))
            .with_effect(Effect::ExecuteTools { calls }))
        }

        (LoopState::AwaitingCompletion { .. }, Event::CompletionFailed { kind, message }) => {
            Ok(fail(DialogueError::Completion { kind, message }))
        }

        (LoopState::AwaitingCompletion { .. }, Event::CompletionTimedOut { after }) => {
            Ok(fail(DialogueError::CompletionTimeout { after }))
        }

        (LoopState::AwaitingCompletion { .. }, Event::TranscriptRejected { error }) => {
            Ok(fail(DialogueError::UnresolvedInvocation(error)))
        }

        (LoopState::AwaitingCompletion { .. }, Event::Cancelled) => {
            Ok(fail(DialogueError::Cancelled))
        }

        // ============================================================
        // Tool handling
        // ============================================================

        (LoopState::ExecutingTools { round_trip, pending }, Event::ToolsCompleted { results }) => {
            let answers_pending = results.len() == pending.len()
                && results
                    .iter()
                    .zip(pending)
                    .all(|(r, c)| r.tool_call_id == c.id);
            if !answers_pending {
                return Err(TransitionError::InvalidTransition(
                    "tool results do not match pending calls".to_string(),
                ));
            }

            Ok(TransitionResult::new(LoopState::AwaitingCompletion {
                round_trip: round_trip + 1,
            })
            .with_effect(Effect::AppendToolResults { results })
            .with_effect(Effect::notify_state("awaiting_completion"))
            .with_effect(Effect::RequestCompletion))
        }

        (LoopState::ExecutingTools { pending, .. }, Event::ToolResolutionFailed { name }) => {
            let reason = format!("not executed: unknown tool {name}");
            Ok(fail_with_synthetic_results(
                pending,
                &reason,
                DialogueError::UnknownTool { name },
            ))
        }

        (LoopState::ExecutingTools { pending, .. }, Event::Cancelled) => Ok(
            fail_with_synthetic_results(pending, "cancelled", DialogueError::Cancelled),
        ),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} cannot handle {}",
            state.name(),
            event.name()
        ))),
    }
}
