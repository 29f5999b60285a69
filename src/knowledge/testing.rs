//! Deterministic embedders for tests

use super::{Embedder, EmbeddingError};
use crate::llm::LlmError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

const DIMENSIONS: usize = 64;

/// Bag-of-words hashing embedder: texts sharing words score higher.
#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    /// Number of `embed` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            // FNV-1a keeps buckets stable across runs
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            let bucket = usize::try_from(hash % DIMENSIONS as u64).unwrap_or_default();
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_id(&self) -> &str {
        "hash-embedder"
    }
}

/// Always fails like an unreachable provider
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(LlmError::network("connection refused").into())
    }

    fn model_id(&self) -> &str {
        "failing-embedder"
    }
}
