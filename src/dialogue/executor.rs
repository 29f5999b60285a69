//! Dialogue loop executor
//!
//! Drives one exchange: feeds events through the pure transition function
//! and performs the effects it returns. The executor is the single writer of
//! the conversation for the duration of the exchange.

use super::transition::{start, transition};
use super::{DialogueError, Effect, Event, ExchangeOutcome, LoopConfig, LoopNotice, LoopState, ToolResult};
use crate::conversation::{Conversation, ToolCall};
use crate::llm::{LlmRequest, LlmService};
use crate::tools::{Tool, ToolContext, ToolError, ToolRegistry};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const NOTICE_CAPACITY: usize = 64;

/// Counters gathered while performing effects
#[derive(Debug, Default)]
struct ExchangeStats {
    completion_calls: u32,
    tool_calls: usize,
    tool_failures: usize,
}

pub struct DialogueLoop {
    llm: Arc<dyn LlmService>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
    notices: broadcast::Sender<LoopNotice>,
}

impl DialogueLoop {
    pub fn new(llm: Arc<dyn LlmService>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            llm,
            tools,
            config,
            notices,
        }
    }

    /// Receive progress notices for every subsequent exchange
    pub fn subscribe(&self) -> broadcast::Receiver<LoopNotice> {
        self.notices.subscribe()
    }

    /// Run one user message through the tool-calling loop.
    ///
    /// Whatever the outcome, every tool call appended to `conversation`
    /// has a matching result when this returns.
    pub async fn run_exchange(
        &self,
        conversation: &mut Conversation,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, DialogueError> {
        tracing::info!(conv_id = %conversation.id(), "Starting exchange");
        let mut stats = ExchangeStats::default();

        let initial = start(text);
        let mut state = initial.new_state;
        let mut events = Vec::new();
        for effect in initial.effects {
            if let Some(event) = self
                .execute_effect(effect, conversation, cancel, &mut stats)
                .await
            {
                events.push(event);
            }
        }

        while let Some(event) = events.pop() {
            let event_name = event.name();
            let result = transition(&state, &self.config, event)
                .map_err(|e| DialogueError::InvalidTransition(e.to_string()))?;

            tracing::debug!(
                conv_id = %conversation.id(),
                from = state.name(),
                to = result.new_state.name(),
                event = event_name,
                "Transition"
            );
            state = result.new_state;

            for effect in result.effects {
                if let Some(generated) = self
                    .execute_effect(effect, conversation, cancel, &mut stats)
                    .await
                {
                    events.push(generated);
                }
            }
        }

        match state {
            LoopState::Done { answer } => {
                tracing::info!(
                    conv_id = %conversation.id(),
                    round_trips = stats.completion_calls,
                    tool_calls = stats.tool_calls,
                    tool_failures = stats.tool_failures,
                    "Exchange complete"
                );
                Ok(ExchangeOutcome {
                    answer,
                    round_trips: stats.completion_calls,
                    tool_calls: stats.tool_calls,
                    tool_failures: stats.tool_failures,
                })
            }
            LoopState::Failed { error } => {
                tracing::warn!(conv_id = %conversation.id(), error = %error, "Exchange failed");
                Err(error)
            }
            other => Err(DialogueError::InvalidTransition(format!(
                "exchange stopped in non-terminal state {}",
                other.name()
            ))),
        }
    }

    async fn execute_effect(
        &self,
        effect: Effect,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
        stats: &mut ExchangeStats,
    ) -> Option<Event> {
        match effect {
            Effect::AppendTurn { turn } => {
                conversation.append(turn);
                None
            }

            Effect::AppendToolResults { results } => {
                conversation.extend(results.into_iter().map(ToolResult::into_turn));
                None
            }

            Effect::Notify { notice } => {
                // No subscribers is fine
                let _ = self.notices.send(notice);
                None
            }

            Effect::RequestCompletion => {
                if cancel.is_cancelled() {
                    return Some(Event::Cancelled);
                }
                stats.completion_calls += 1;
                Some(self.request_completion(conversation, stats.completion_calls).await)
            }

            Effect::ExecuteTools { calls } => {
                if cancel.is_cancelled() {
                    return Some(Event::Cancelled);
                }
                Some(
                    self.execute_tools(conversation.id(), calls, cancel, stats)
                        .await,
                )
            }
        }
    }

    async fn request_completion(&self, conversation: &Conversation, round_trip: u32) -> Event {
        let turns = match conversation.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => return Event::TranscriptRejected { error },
        };

        let request = LlmRequest {
            model: self.config.model_id.clone(),
            turns,
            tools: self.tools.describe(),
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!(conv_id = %conversation.id(), round_trip, "Requesting completion");
        match tokio::time::timeout(self.config.completion_timeout, self.llm.complete(&request)).await
        {
            Ok(Ok(response)) => Event::CompletionReceived { response },
            Ok(Err(e)) => Event::CompletionFailed {
                kind: e.kind,
                message: e.message,
            },
            Err(_) => Event::CompletionTimedOut {
                after: self.config.completion_timeout,
            },
        }
    }

    /// Resolve every name first, then run all handlers concurrently.
    /// Results come back in request order.
    async fn execute_tools(
        &self,
        conversation_id: &str,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
        stats: &mut ExchangeStats,
    ) -> Event {
        let mut resolved = Vec::with_capacity(calls.len());
        for call in calls {
            match self.tools.resolve(&call.name) {
                Ok(tool) => resolved.push((call, tool)),
                Err(e) => {
                    tracing::warn!(conv_id = %conversation_id, tool = %call.name, error = %e, "Unknown tool requested");
                    return Event::ToolResolutionFailed { name: call.name };
                }
            }
        }

        let results: Vec<ToolResult> = join_all(
            resolved
                .iter()
                .map(|(call, tool)| self.run_tool(conversation_id, call, tool, cancel)),
        )
        .await;

        stats.tool_calls += results.len();
        stats.tool_failures += results.iter().filter(|r| r.is_error).count();
        Event::ToolsCompleted { results }
    }

    async fn run_tool(
        &self,
        conversation_id: &str,
        call: &ToolCall,
        tool: &Arc<dyn Tool>,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let _ = self.notices.send(LoopNotice::ToolStarted {
            id: call.id.clone(),
            name: call.name.clone(),
        });
        let start = Instant::now();

        let outcome = match call.parsed_arguments() {
            Err(e) => Err(ToolError::InvalidInput(format!("arguments are not valid JSON: {e}"))),
            Ok(input) => {
                let ctx = ToolContext::new(
                    cancel.child_token(),
                    conversation_id.to_string(),
                    call.id.clone(),
                );
                self.spawn_tool(Arc::clone(tool), input, ctx).await
            }
        };

        let result = match outcome {
            Ok(payload) => ToolResult::success(call.id.clone(), payload),
            Err(e) => {
                tracing::warn!(
                    conv_id = %conversation_id,
                    tool = %call.name,
                    id = %call.id,
                    error = %e,
                    "Tool failed"
                );
                ToolResult::error(call.id.clone(), e.to_string())
            }
        };

        tracing::info!(
            conv_id = %conversation_id,
            tool = %call.name,
            id = %call.id,
            duration_ms = %start.elapsed().as_millis(),
            is_error = result.is_error,
            "Tool finished"
        );
        let _ = self.notices.send(LoopNotice::ToolFinished {
            id: call.id.clone(),
            name: call.name.clone(),
            is_error: result.is_error,
        });
        result
    }

    /// Run the handler on its own task so a panic becomes an error result
    /// instead of unwinding through the exchange.
    async fn spawn_tool(
        &self,
        tool: Arc<dyn Tool>,
        input: Value,
        ctx: ToolContext,
    ) -> Result<Value, ToolError> {
        let handle = tokio::spawn(async move { tool.run(input, ctx).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.config.tool_timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!(error = %e, "Tool panicked");
                Err(ToolError::Failed("tool panicked".to_string()))
            }
            Ok(Err(e)) => Err(ToolError::Failed(format!("tool task ended: {e}"))),
            Err(_) => {
                abort.abort();
                Err(ToolError::Timeout(self.config.tool_timeout))
            }
        }
    }
}
