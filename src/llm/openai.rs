//! `OpenAI` chat-completions binding

use super::types::{LlmRequest, LlmResponse, ToolDefinition, Usage};
use super::{LlmError, LlmService};
use crate::conversation::{ToolCall, Turn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stateless chat-completions service: every call sends the whole transcript
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAIService {
    pub fn new(api_key: String, model: String, base_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> ChatRequest {
        let messages = request.turns.turns().iter().map(translate_turn).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(translate_tool).collect())
        };
        let tool_choice = tools.as_ref().map(|_| "auto".to_string());

        ChatRequest {
            model: request.model.clone(),
            messages,
            tools,
            tool_choice,
            max_tokens: request.max_tokens,
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No choices in response"))?;

        let text = choice.message.content.filter(|t| !t.is_empty());

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(LlmResponse {
            text,
            tool_calls,
            end_turn: choice.finish_reason.as_deref() == Some("stop"),
            usage,
        })
    }
}

fn translate_turn(turn: &Turn) -> ChatMessage {
    match turn {
        Turn::System { content } => ChatMessage::plain("system", content),
        Turn::User { content } => ChatMessage::plain("user", content),
        Turn::Assistant {
            content,
            tool_calls,
        } => ChatMessage {
            role: "assistant".to_string(),
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|c| ChatToolCall {
                            id: c.id.clone(),
                            r#type: "function".to_string(),
                            function: ChatFunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: None,
        },
        Turn::Tool {
            tool_call_id,
            content,
        } => ChatMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn translate_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        r#type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Chat completions wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorResponse {
    pub(super) error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiError {
    pub(super) message: String,
}
