//! Ingestion and retrieval services
//!
//! [`KnowledgeBase`] is the concrete implementation of both seams: it loads a
//! document, splits it into overlapping chunks, embeds them and stores them
//! in SQLite; queries are embedded and scored against every stored chunk.

mod chunker;
mod embedding;
mod loader;
mod store;

#[cfg(test)]
pub mod testing;

pub use chunker::TextSplitter;
pub use embedding::{Embedder, EmbeddingError, OpenAIEmbedder};
pub use loader::{load_document, LoadError};
pub use store::{ChunkStore, ScoredChunk, StoreError};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Summary of one ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub chunk_count: usize,
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("could not extract text: {0}")]
    Extraction(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<LoadError> for IngestionError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NotFound(path) => Self::SourceNotFound(path),
            other => Self::Extraction(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("limit must be at least 1")]
    InvalidLimit,
    #[error("query must not be empty")]
    EmptyQuery,
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Loads a source document into the searchable store.
///
/// Not idempotent: ingesting the same source twice stores its chunks twice.
#[async_trait]
pub trait IngestionService: Send + Sync {
    async fn ingest(&self, source: &str) -> Result<IngestReport, IngestionError>;
}

/// Returns stored text chunks most relevant to a query, best first
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>, RetrievalError>;
}

pub struct KnowledgeBase {
    store: ChunkStore,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
}

impl KnowledgeBase {
    pub fn new(store: ChunkStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            splitter: TextSplitter::default(),
        }
    }

    #[must_use]
    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Run a store operation off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ChunkStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl IngestionService for KnowledgeBase {
    async fn ingest(&self, source: &str) -> Result<IngestReport, IngestionError> {
        let start = std::time::Instant::now();
        let text = load_document(Path::new(source)).await?;

        let chunks = self.splitter.split(&text);
        if chunks.is_empty() {
            tracing::warn!(source, "Document contained no text");
            return Ok(IngestReport { chunk_count: 0 });
        }

        let embeddings = self.embedder.embed(&chunks).await?;

        let owned_source = source.to_string();
        let chunk_count = self
            .blocking(move |store| store.insert_chunks(&owned_source, &chunks, &embeddings))
            .await?;

        tracing::info!(
            source,
            chunks = chunk_count,
            duration_ms = %start.elapsed().as_millis(),
            "Ingested document"
        );
        Ok(IngestReport { chunk_count })
    }
}

#[async_trait]
impl RetrievalService for KnowledgeBase {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>, RetrievalError> {
        if limit == 0 {
            return Err(RetrievalError::InvalidLimit);
        }
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        if self.blocking(ChunkStore::count).await? == 0 {
            tracing::debug!("Store is empty, nothing to retrieve");
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_vector) = vectors.pop() else {
            return Err(EmbeddingError::Malformed("no vector for query".to_string()).into());
        };

        let hits = self
            .blocking(move |store| store.search(&query_vector, limit))
            .await?;
        tracing::debug!(query, hits = hits.len(), "Retrieved chunks");
        Ok(hits.into_iter().map(|h| h.content).collect())
    }
}
