//! Tool registry and the retrieval tools exposed to the model
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! its JSON input and a per-call [`ToolContext`].

mod ingest;
mod retrieve;

pub use ingest::IngestTool;
pub use retrieve::RetrieveTool;

use crate::knowledge::{IngestionError, IngestionService, RetrievalError, RetrievalService};
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Context injected into every tool invocation
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,

    /// The conversation this tool is executing within
    pub conversation_id: String,

    /// Id of the invocation request being answered
    pub tool_call_id: String,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, conversation_id: String, tool_call_id: String) -> Self {
        Self {
            cancel,
            conversation_id,
            tool_call_id,
        }
    }
}

/// Handler failure. Always turned into an error-shaped tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Trait for tools the model can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool. Long-running handlers should watch `ctx.cancel`.
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError>;
}

/// Name-indexed collection of tools, built once and shared read-only
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `fn_ingest` and `fn_retrieve`
    pub fn standard(
        ingestion: Arc<dyn IngestionService>,
        retrieval: Arc<dyn RetrievalService>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(IngestTool::new(ingestion)))?;
        registry.register(Arc::new(RetrieveTool::new(retrieval)))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.index
            .get(name)
            .and_then(|&i| self.tools.get(i))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Definitions in registration order
    pub fn describe(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
