//! `OpenAI` Assistants v2 binding
//!
//! The provider keeps its own copy of the transcript in a thread. Each
//! `complete` call forwards only the turns appended since the previous call,
//! starts (or resumes) a run and polls it until it either finishes or asks
//! for tool outputs.

use super::openai::ApiErrorResponse;
use super::types::{LlmRequest, LlmResponse, ToolDefinition, Usage};
use super::{LlmError, LlmService};
use crate::conversation::{ToolCall, Turn};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CANCEL_WAIT: Duration = Duration::from_secs(30);

/// Stateful thread/run service. One instance drives one provider thread.
pub struct AssistantsService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    poll_interval: Duration,
    state: Mutex<ThreadState>,
}

#[derive(Debug, Default)]
struct ThreadState {
    assistant_id: Option<String>,
    thread_id: Option<String>,
    /// Number of transcript turns already mirrored into the thread
    synced_turns: usize,
    run: Option<RunHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RunHandle {
    id: String,
    /// The run stopped in `requires_action` and waits for tool outputs
    awaiting_outputs: bool,
}

/// What to send to the thread before polling
#[derive(Debug, PartialEq, Eq)]
enum SyncPlan {
    SubmitToolOutputs {
        run_id: String,
        outputs: Vec<ToolOutput>,
    },
    StartRun {
        cancel: Option<String>,
        messages: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ToolOutput {
    tool_call_id: String,
    output: String,
}

/// Decide how to mirror the newly appended turns.
///
/// Tool results resume a run that is waiting for them. Anything else (a new
/// user message, or a run abandoned mid-poll) cancels the outstanding run and
/// starts a fresh one. Assistant turns are skipped; the thread already has
/// them.
fn plan_sync(new_turns: &[Turn], run: Option<&RunHandle>) -> SyncPlan {
    let mut outputs = Vec::new();
    let mut messages = Vec::new();
    for turn in new_turns {
        match turn {
            Turn::Tool {
                tool_call_id,
                content,
            } => outputs.push(ToolOutput {
                tool_call_id: tool_call_id.clone(),
                output: content.clone(),
            }),
            Turn::User { content } => messages.push(content.clone()),
            Turn::System { .. } | Turn::Assistant { .. } => {}
        }
    }

    match run {
        Some(handle) if handle.awaiting_outputs && messages.is_empty() && !outputs.is_empty() => {
            SyncPlan::SubmitToolOutputs {
                run_id: handle.id.clone(),
                outputs,
            }
        }
        _ => SyncPlan::StartRun {
            cancel: run.map(|h| h.id.clone()),
            messages,
        },
    }
}

/// Outcome of one poll of a run
#[derive(Debug, PartialEq)]
enum RunProgress {
    Pending,
    Completed(Usage),
    RequiresAction(Vec<ToolCall>, Usage),
    Failed(String),
}

fn classify_run(run: &RunObject) -> RunProgress {
    let usage = run.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    match run.status.as_str() {
        "completed" => RunProgress::Completed(usage),
        "requires_action" => {
            let calls = run
                .required_action
                .as_ref()
                .map(|a| {
                    a.submit_tool_outputs
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            ToolCall::new(
                                tc.id.clone(),
                                tc.function.name.clone(),
                                tc.function.arguments.clone(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            RunProgress::RequiresAction(calls, usage)
        }
        "failed" | "cancelled" | "expired" | "incomplete" => {
            let detail = run
                .last_error
                .as_ref()
                .map_or_else(|| "no detail".to_string(), |e| e.message.clone());
            RunProgress::Failed(format!("run {} ended as {}: {detail}", run.id, run.status))
        }
        _ => RunProgress::Pending,
    }
}

fn message_text(message: &MessageObject) -> Option<String> {
    let text: Vec<&str> = message
        .content
        .iter()
        .filter_map(|c| c.text.as_ref().map(|t| t.value.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join("\n"))
    }
}

impl AssistantsService {
    pub fn new(api_key: String, model: String, base_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(ThreadState::default()),
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LlmError> {
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(err) => LlmError::from_status(status.as_u16(), &err.error.message),
                Err(_) => LlmError::from_status(status.as_u16(), &body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| LlmError::unknown(format!("Failed to parse response: {e} - body: {body}")))
    }

    async fn ensure_assistant(
        &self,
        state: &mut ThreadState,
        request: &LlmRequest,
    ) -> Result<String, LlmError> {
        if let Some(id) = &state.assistant_id {
            return Ok(id.clone());
        }

        let tools: Vec<_> = request.tools.iter().map(assistant_tool).collect();
        let body = json!({
            "model": request.model,
            "instructions": request.turns.system_prompt().unwrap_or_default(),
            "tools": tools,
        });
        let created: IdObject = self.send(self.post("assistants").json(&body)).await?;
        tracing::info!(assistant_id = %created.id, "Created assistant");
        state.assistant_id = Some(created.id.clone());
        Ok(created.id)
    }

    async fn ensure_thread(&self, state: &mut ThreadState) -> Result<String, LlmError> {
        if let Some(id) = &state.thread_id {
            return Ok(id.clone());
        }
        let created: IdObject = self.send(self.post("threads").json(&json!({}))).await?;
        tracing::info!(thread_id = %created.id, "Created thread");
        state.thread_id = Some(created.id.clone());
        Ok(created.id)
    }

    async fn poll(&self, thread_id: &str, run_id: &str) -> Result<RunProgress, LlmError> {
        loop {
            let run: RunObject = self
                .send(self.get(&format!("threads/{thread_id}/runs/{run_id}")))
                .await?;
            let progress = classify_run(&run);
            if progress != RunProgress::Pending {
                return Ok(progress);
            }
            tracing::debug!(run_id, status = %run.status, "Run still in progress");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Cancel a run and wait until it stops. The thread rejects new
    /// messages while any run on it is still active.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), LlmError> {
        let path = format!("threads/{thread_id}/runs/{run_id}/cancel");
        if let Err(e) = self.send::<IdObject>(self.post(&path)).await {
            // Usually the run already finished on its own
            tracing::warn!(run_id, error = %e, "Failed to cancel stale run");
        }

        match tokio::time::timeout(CANCEL_WAIT, self.poll(thread_id, run_id)).await {
            Ok(progress) => {
                let progress = progress?;
                tracing::debug!(run_id, ?progress, "Stale run stopped");
                Ok(())
            }
            Err(_) => Err(LlmError::network(format!(
                "run {run_id} still active {}s after cancel",
                CANCEL_WAIT.as_secs()
            ))),
        }
    }

    async fn latest_answer(&self, thread_id: &str) -> Result<Option<String>, LlmError> {
        let list: MessageList = self
            .send(
                self.get(&format!("threads/{thread_id}/messages"))
                    .query(&[("limit", "1"), ("order", "desc")]),
            )
            .await?;
        Ok(list
            .data
            .first()
            .filter(|m| m.role == "assistant")
            .and_then(message_text))
    }
}

fn assistant_tool(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

#[async_trait]
impl LlmService for AssistantsService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut state = self.state.lock().await;
        let assistant_id = self.ensure_assistant(&mut state, request).await?;
        let thread_id = self.ensure_thread(&mut state).await?;

        let turns = request.turns.turns();
        let new_turns = turns.get(state.synced_turns..).unwrap_or_default();

        let run_id = match plan_sync(new_turns, state.run.as_ref()) {
            SyncPlan::SubmitToolOutputs { run_id, outputs } => {
                let path = format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs");
                let _: IdObject = self
                    .send(self.post(&path).json(&json!({ "tool_outputs": outputs })))
                    .await?;
                run_id
            }
            SyncPlan::StartRun { cancel, messages } => {
                if let Some(stale) = cancel {
                    self.cancel_run(&thread_id, &stale).await?;
                    state.run = None;
                }
                for content in messages {
                    let path = format!("threads/{thread_id}/messages");
                    let _: IdObject = self
                        .send(
                            self.post(&path)
                                .json(&json!({ "role": "user", "content": content })),
                        )
                        .await?;
                }
                let path = format!("threads/{thread_id}/runs");
                let run: IdObject = self
                    .send(self.post(&path).json(&json!({ "assistant_id": assistant_id })))
                    .await?;
                run.id
            }
        };

        state.synced_turns = turns.len();
        // Cleared only once the run reaches a stopping point; an interrupted
        // poll leaves it here to be cancelled on the next call.
        state.run = Some(RunHandle {
            id: run_id.clone(),
            awaiting_outputs: false,
        });

        match self.poll(&thread_id, &run_id).await? {
            RunProgress::RequiresAction(calls, usage) => {
                state.run = Some(RunHandle {
                    id: run_id,
                    awaiting_outputs: true,
                });
                Ok(LlmResponse {
                    text: None,
                    tool_calls: calls,
                    end_turn: false,
                    usage,
                })
            }
            RunProgress::Completed(usage) => {
                state.run = None;
                let text = self.latest_answer(&thread_id).await?;
                Ok(LlmResponse {
                    text,
                    tool_calls: vec![],
                    end_turn: true,
                    usage,
                })
            }
            RunProgress::Failed(message) => {
                state.run = None;
                Err(LlmError::run_failed(message))
            }
            RunProgress::Pending => Err(LlmError::unknown("run polling stopped early")),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Assistants wire types

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunError>,
    #[serde(default)]
    usage: Option<RunUsage>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<RunToolCall>,
}

#[derive(Debug, Deserialize)]
struct RunToolCall {
    id: String,
    function: RunFunction,
}

#[derive(Debug, Deserialize)]
struct RunFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct RunError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct RunUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}
