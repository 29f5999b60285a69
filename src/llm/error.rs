//! Completion client error types

use std::fmt;
use thiserror::Error;

/// Provider failure with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn run_failed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RunFailed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status from the provider
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!("Authentication failed: {message}")),
            429 => Self::rate_limit(format!("Rate limit exceeded: {message}")),
            400 | 404 | 422 => Self::invalid_request(format!("Invalid request: {message}")),
            500..=599 => Self::server_error(format!("Server error: {message}")),
            _ => Self::unknown(format!("HTTP {status}: {message}")),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Network issues, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400)
    InvalidRequest,
    /// A provider-side run ended in failed, cancelled or expired
    RunFailed,
    Unknown,
}

impl LlmErrorKind {
    /// Whether re-running the whole exchange may succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::RunFailed => "run_failed",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
