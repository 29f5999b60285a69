//! `fn_retrieve`: vector search over ingested chunks

use super::{Tool, ToolContext, ToolError};
use crate::knowledge::RetrievalService;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_K: usize = 3;

pub struct RetrieveTool {
    retrieval: Arc<dyn RetrievalService>,
}

impl RetrieveTool {
    pub fn new(retrieval: Arc<dyn RetrievalService>) -> Self {
        Self { retrieval }
    }
}

#[derive(Debug, Deserialize)]
struct RetrieveInput {
    query: String,
    /// Models sometimes send `3.0`; accept any number
    #[serde(default)]
    k: Option<f64>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_k(k: Option<f64>) -> Result<usize, ToolError> {
    let Some(k) = k else {
        return Ok(DEFAULT_K);
    };
    if !k.is_finite() || k.fract() != 0.0 || k < 0.0 || k > f64::from(u32::MAX) {
        return Err(ToolError::InvalidInput(format!(
            "k must be a non-negative integer, got {k}"
        )));
    }
    Ok(k as usize)
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &'static str {
        "fn_retrieve"
    }

    fn description(&self) -> String {
        "Retrieve relevant text chunks using vector search".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for"
                },
                "k": {
                    "type": "number",
                    "description": "Number of chunks to return (default 3)"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError> {
        let input: RetrieveInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        let k = parse_k(input.k)?;

        tracing::debug!(
            conv_id = %ctx.conversation_id,
            id = %ctx.tool_call_id,
            query = %input.query,
            k,
            "Retrieving chunks"
        );
        let chunks = self.retrieval.retrieve(&input.query, k).await?;
        Ok(json!({ "chunks": chunks }))
    }
}
