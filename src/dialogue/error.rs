//! Exchange failure taxonomy

use crate::conversation::ConversationError;
use crate::llm::LlmErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Why an exchange ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    #[error("transcript rejected: {0}")]
    UnresolvedInvocation(#[from] ConversationError),

    #[error("model requested unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("tool loop exceeded {max} round trips")]
    LoopBudgetExceeded { max: u32 },

    #[error("duplicate tool call id in one response: {id}")]
    DuplicateInvocation { id: String },

    #[error("completion timed out after {after:?}")]
    CompletionTimeout { after: Duration },

    #[error("completion failed ({kind}): {message}")]
    Completion { kind: LlmErrorKind, message: String },

    #[error("exchange cancelled")]
    Cancelled,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl DialogueError {
    /// Whether re-running the whole exchange may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Completion { kind, .. } => kind.is_retryable(),
            Self::CompletionTimeout { .. } => true,
            _ => false,
        }
    }

    /// Single line shown to the person at the prompt
    pub fn user_message(&self) -> String {
        let detail = match self {
            Self::Cancelled => return "Request cancelled.".to_string(),
            Self::Completion {
                kind: LlmErrorKind::Auth,
                ..
            } => "the API key was rejected".to_string(),
            Self::Completion {
                kind: LlmErrorKind::RateLimit,
                ..
            } => "the provider is rate limiting requests".to_string(),
            Self::CompletionTimeout { after } => format!("the model did not answer within {after:?}"),
            Self::LoopBudgetExceeded { .. } => "the model kept calling tools without answering".to_string(),
            other => other.to_string(),
        };
        let hint = if self.is_retryable() {
            " Please try again."
        } else {
            ""
        };
        format!("Sorry, I could not complete the request: {detail}.{hint}")
    }
}
