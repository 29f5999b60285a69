//! Mock implementations for testing
//!
//! These mocks let the dialogue loop run end to end without network I/O.

use crate::conversation::ToolCall;
use crate::knowledge::{
    IngestReport, IngestionError, IngestionService, RetrievalError, RetrievalService,
};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::tools::{Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock completion clients
// ============================================================================

/// Completion client that returns queued responses in order
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Queue a response requesting one call
    pub fn queue_call(&self, id: &str, name: &str, arguments: Value) {
        self.queue_response(LlmResponse::requesting(vec![ToolCall::new(
            id,
            name,
            arguments.to_string(),
        )]));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::answer(text));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        // Every request must carry a consistent transcript
        assert!(
            request.turns.system_prompt().is_some(),
            "request without system turn"
        );
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

/// Completion client that sleeps before answering
pub struct DelayedLlmClient {
    delay: Duration,
    response: LlmResponse,
    pub calls: AtomicUsize,
}

impl DelayedLlmClient {
    pub fn new(delay: Duration, response: LlmResponse) -> Self {
        Self {
            delay,
            response,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmService for DelayedLlmClient {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }

    fn model_id(&self) -> &str {
        "delayed-model"
    }
}

// ============================================================================
// Scripted tool
// ============================================================================

#[derive(Debug, Clone)]
pub enum ToolBehavior {
    Return(Value),
    Fail(String),
    /// Sleep, then return the value
    Sleep(Duration, Value),
    /// Wait for cancellation of the per-call token
    AwaitCancel,
    Panic,
}

/// Tool with a fixed behavior that records every invocation
pub struct ScriptedTool {
    name: String,
    behavior: ToolBehavior,
    pub inputs: Mutex<Vec<Value>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedTool {
    pub fn new(name: &str, behavior: ToolBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            inputs: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn invocations(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    /// Handlers started but not yet returned
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Scripted {}", self.name)
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError> {
        self.inputs.lock().unwrap().push(input);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match &self.behavior {
            ToolBehavior::Return(v) => Ok(v.clone()),
            ToolBehavior::Fail(msg) => Err(ToolError::Failed(msg.clone())),
            ToolBehavior::Sleep(d, v) => {
                tokio::time::sleep(*d).await;
                Ok(v.clone())
            }
            ToolBehavior::AwaitCancel => {
                ctx.cancel.cancelled().await;
                Err(ToolError::Failed("cancelled".into()))
            }
            ToolBehavior::Panic => panic!("{} blew up", self.name),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// Fake knowledge services
// ============================================================================

/// In-memory stand-in for the knowledge base
pub struct FakeKnowledge {
    pub chunks: Vec<String>,
    pub ingested: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl FakeKnowledge {
    pub fn with_chunks(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| (*c).to_string()).collect(),
            ingested: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl IngestionService for FakeKnowledge {
    async fn ingest(&self, source: &str) -> Result<IngestReport, IngestionError> {
        if !source.ends_with(".pdf") || source.contains("missing") {
            return Err(IngestionError::SourceNotFound(PathBuf::from(source)));
        }
        self.ingested.lock().unwrap().push(source.to_string());
        Ok(IngestReport { chunk_count: 7 })
    }
}

#[async_trait]
impl RetrievalService for FakeKnowledge {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>, RetrievalError> {
        if limit == 0 {
            return Err(RetrievalError::InvalidLimit);
        }
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), limit));
        Ok(self.chunks.iter().take(limit).cloned().collect())
    }
}
