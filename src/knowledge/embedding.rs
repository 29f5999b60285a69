//! Text embedding service

use crate::llm::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Maximum inputs per embeddings request
pub const MAX_BATCH: usize = 96;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(#[from] LlmError),
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Converts text into fixed-dimensional vectors.
///
/// Output order matches input order; one vector per input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model_id(&self) -> &str;
}

/// `OpenAI` embeddings endpoint
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, model: String, base_url: &str) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body).into());
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        order_embeddings(parsed, batch.len())
    }
}

/// Put vectors back in input order and check the count
fn order_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::Malformed(format!(
            "expected {expected} vectors, got {}",
            response.data.len()
        )));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!(model = %self.model, inputs = texts.len(), "Embedded texts");
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorders_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ]
        }))
        .unwrap();
        let vectors = order_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        let response = EmbeddingResponse { data: vec![] };
        assert!(matches!(
            order_embeddings(response, 3),
            Err(EmbeddingError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        let embedder =
            OpenAIEmbedder::new("sk-x".into(), "text-embedding-ada-002".into(), "http://localhost:9/v1/")
                .unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:9/v1/embeddings");
        assert_eq!(embedder.model_id(), "text-embedding-ada-002");
    }
}
