//! Effects produced by state transitions

use super::{LoopNotice, ToolResult};
use crate::conversation::{ToolCall, Turn};

/// Work for the executor after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append one turn to the conversation
    AppendTurn { turn: Turn },

    /// Append tool results as one batch, in the given order
    AppendToolResults { results: Vec<ToolResult> },

    /// Snapshot the conversation and call the completion client
    RequestCompletion,

    /// Resolve and run the requested tools concurrently
    ExecuteTools { calls: Vec<ToolCall> },

    /// Publish a progress notice
    Notify { notice: LoopNotice },
}

impl Effect {
    pub fn notify_state(state: &'static str) -> Self {
        Effect::Notify {
            notice: LoopNotice::StateChanged { state },
        }
    }

    pub fn notify_done(answer: &str) -> Self {
        Effect::Notify {
            notice: LoopNotice::Done {
                answer: answer.to_string(),
            },
        }
    }

    pub fn notify_failed(message: String) -> Self {
        Effect::Notify {
            notice: LoopNotice::Failed { message },
        }
    }
}
