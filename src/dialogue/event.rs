//! Events fed to the transition function

use super::ToolResult;
use crate::conversation::ConversationError;
use crate::llm::{LlmErrorKind, LlmResponse};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Event {
    // Completion events
    CompletionReceived {
        response: LlmResponse,
    },
    CompletionFailed {
        kind: LlmErrorKind,
        message: String,
    },
    CompletionTimedOut {
        after: Duration,
    },
    TranscriptRejected {
        error: ConversationError,
    },

    // Tool events
    /// One result per pending call, in request order
    ToolsCompleted {
        results: Vec<ToolResult>,
    },
    ToolResolutionFailed {
        name: String,
    },

    Cancelled,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompletionReceived { .. } => "completion_received",
            Self::CompletionFailed { .. } => "completion_failed",
            Self::CompletionTimedOut { .. } => "completion_timed_out",
            Self::TranscriptRejected { .. } => "transcript_rejected",
            Self::ToolsCompleted { .. } => "tools_completed",
            Self::ToolResolutionFailed { .. } => "tool_resolution_failed",
            Self::Cancelled => "cancelled",
        }
    }
}
