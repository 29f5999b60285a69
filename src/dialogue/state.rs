//! Dialogue loop state types

use super::DialogueError;
use crate::conversation::{ToolCall, Turn};
use serde_json::{json, Value};
use std::time::Duration;

/// Answer used when the model returns neither text nor tool calls
pub const FALLBACK_ANSWER: &str = "I couldn't generate a response.";

/// Position of one exchange in the tool-calling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on completion call number `round_trip` (1-based)
    AwaitingCompletion { round_trip: u32 },

    /// Running the tool calls requested by completion `round_trip`
    ExecutingTools {
        round_trip: u32,
        pending: Vec<ToolCall>,
    },

    Done { answer: String },

    Failed { error: DialogueError },
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingCompletion { .. } => "awaiting_completion",
            Self::ExecutingTools { .. } => "executing_tools",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Static limits for one dialogue loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model_id: String,
    /// Completion calls that may request tools; one more call that still
    /// requests tools fails the exchange
    pub max_round_trips: u32,
    pub completion_timeout: Duration,
    pub tool_timeout: Duration,
    pub max_tokens: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model_id: crate::config::DEFAULT_MODEL.to_string(),
            max_round_trips: 10,
            completion_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(120),
            max_tokens: None,
        }
    }
}

/// Outcome of one tool call, as appended to the transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub payload: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            payload,
            is_error: false,
        }
    }

    /// Error-shaped result: `{"error": message}`
    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            payload: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    pub fn into_turn(self) -> Turn {
        Turn::tool(self.tool_call_id, self.payload.to_string())
    }
}

/// Result of a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub answer: String,
    /// Completion calls made
    pub round_trips: u32,
    pub tool_calls: usize,
    pub tool_failures: usize,
}

impl ExchangeOutcome {
    /// At least one tool failed; the answer is best-effort
    pub fn is_degraded(&self) -> bool {
        self.tool_failures > 0
    }
}

/// Progress published while an exchange runs
#[derive(Debug, Clone, PartialEq)]
pub enum LoopNotice {
    StateChanged { state: &'static str },
    ToolStarted { id: String, name: String },
    ToolFinished { id: String, name: String, is_error: bool },
    Done { answer: String },
    Failed { message: String },
}
