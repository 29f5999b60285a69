//! Common types for completion requests

use crate::conversation::{Snapshot, ToolCall};
use serde::Serialize;

/// Completion request: the frozen transcript plus the advertised tools
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub turns: Snapshot,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Normalized completion response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Provider signalled that the turn is finished
    pub end_turn: bool,
    pub usage: Usage,
}

impl LlmResponse {
    /// A terminal text answer
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: vec![],
            end_turn: true,
            usage: Usage::default(),
        }
    }

    /// A response asking for tool calls
    pub fn requesting(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
            end_turn: false,
            usage: Usage::default(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
