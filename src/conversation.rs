//! Conversation state
//!
//! An append-only transcript owned by one session. The first turn is always
//! the system turn; tool results must answer every tool call of the
//! assistant turn that precedes them before the transcript can be sent to
//! the model again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// A tool invocation requested by the model.
///
/// `arguments` is kept exactly as the provider emitted it and is only parsed
/// when the call is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument payload. An empty payload is treated as `{}`.
    pub fn parsed_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// One entry in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Turn::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Turn::Assistant {
            content,
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Turn::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Turn::System { .. } => "system",
            Turn::User { .. } => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::Tool { .. } => "tool",
        }
    }

    /// Tool calls carried by an assistant turn (empty for every other role)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Turn::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Transcript violations detected before a completion request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("tool calls without a result: {}", ids.join(", "))]
    UnresolvedInvocation { ids: Vec<String> },
    #[error("tool result {tool_call_id} does not answer any outstanding tool call")]
    UnmatchedToolResult { tool_call_id: String },
}

/// Immutable view of the transcript handed to the completion client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    turns: Arc<[Turn]>,
}

impl Snapshot {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Instruction text of the leading system turn
    pub fn system_prompt(&self) -> Option<&str> {
        match self.turns.first() {
            Some(Turn::System { content }) => Some(content),
            _ => None,
        }
    }
}

/// Per-session transcript
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Conversation {
    /// Start a conversation whose first turn carries the given instructions
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: vec![Turn::system(system_prompt)],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    /// Validate the transcript and freeze it for a completion request.
    pub fn snapshot(&self) -> Result<Snapshot, ConversationError> {
        check_invocations(&self.turns)?;
        Ok(Snapshot {
            turns: Arc::from(self.turns.as_slice()),
        })
    }

    /// Tool call ids of the latest assistant turn that still lack a result
    pub fn unresolved_invocations(&self) -> Vec<String> {
        let Some(start) = self
            .turns
            .iter()
            .rposition(|t| matches!(t, Turn::Assistant { .. }))
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.turns[start + 1..]
            .iter()
            .filter_map(|t| match t {
                Turn::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        self.turns[start]
            .tool_calls()
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }
}

/// Every tool call must be answered by exactly one tool turn before the next
/// non-tool turn, and every tool turn must answer an outstanding call.
fn check_invocations(turns: &[Turn]) -> Result<(), ConversationError> {
    let mut outstanding: Vec<String> = Vec::new();

    for turn in turns {
        match turn {
            Turn::Tool { tool_call_id, .. } => {
                let Some(pos) = outstanding.iter().position(|id| id == tool_call_id) else {
                    return Err(ConversationError::UnmatchedToolResult {
                        tool_call_id: tool_call_id.clone(),
                    });
                };
                outstanding.swap_remove(pos);
            }
            other => {
                if !outstanding.is_empty() {
                    outstanding.sort();
                    return Err(ConversationError::UnresolvedInvocation { ids: outstanding });
                }
                outstanding = other.tool_calls().iter().map(|c| c.id.clone()).collect();
            }
        }
    }

    if outstanding.is_empty() {
        Ok(())
    } else {
        outstanding.sort();
        Err(ConversationError::UnresolvedInvocation { ids: outstanding })
    }
}
