//! Completion client abstraction
//!
//! The dialogue loop talks to the model through [`LlmService`]. Two
//! bindings exist: a stateless chat-completions call and a stateful
//! thread/run binding that polls the provider internally.

mod assistants;
mod error;
mod openai;
mod types;

pub use assistants::AssistantsService;
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use crate::config::{Config, Transport};
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    turns = request.turns.len(),
                    tool_calls = response.tool_calls.len(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Completion request finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Build the configured binding, wrapped with logging
pub fn build_service(config: &Config) -> Result<Arc<dyn LlmService>, LlmError> {
    let inner: Arc<dyn LlmService> = match config.transport {
        Transport::Chat => Arc::new(OpenAIService::new(
            config.api_key.clone(),
            config.model.clone(),
            &config.base_url,
        )?),
        Transport::Assistants => Arc::new(
            AssistantsService::new(config.api_key.clone(), config.model.clone(), &config.base_url)?
                .with_poll_interval(config.poll_interval),
        ),
    };
    Ok(Arc::new(LoggingService::new(inner)))
}
