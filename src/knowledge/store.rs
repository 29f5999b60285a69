//! SQLite chunk store with brute-force cosine search
//!
//! One row per chunk. Embeddings are stored as little-endian `f32` blobs and
//! scored in process; the store is small enough that a linear scan is fine.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk store lock poisoned")]
    Poisoned,
    #[error("chunk {id} has a corrupt embedding blob")]
    CorruptEmbedding { id: i64 },
    #[error("embedding dimension mismatch: query has {query}, chunk {id} has {stored}")]
    DimensionMismatch { id: i64, query: usize, stored: usize },
    #[error("{chunks} chunks but {embeddings} embeddings")]
    CountMismatch { chunks: usize, embeddings: usize },
    #[error("store task failed: {0}")]
    Task(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
";

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: i64,
    pub content: String,
    pub score: f32,
}

/// Shared handle to the chunk database
#[derive(Clone)]
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore").finish_non_exhaustive()
    }
}

impl ChunkStore {
    /// Open or create the database, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        tracing::info!(path = %path.display(), "Opened chunk store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }

    /// Insert all chunks of one source in a single transaction
    pub fn insert_chunks(
        &self,
        source: &str,
        chunks: &[String],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chunks (source, ordinal, content, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                let now = Utc::now().to_rfc3339();
                for (ordinal, (content, embedding)) in chunks.iter().zip(embeddings).enumerate() {
                    let ordinal = i64::try_from(ordinal).unwrap_or(i64::MAX);
                    stmt.execute(params![source, ordinal, content, encode(embedding), now])?;
                }
            }
            tx.commit()?;
            Ok(chunks.len())
        })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
    }

    /// Top `limit` chunks by cosine similarity; equal scores keep insertion order
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let mut hits = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, content, embedding FROM chunks ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (id, content, blob) = row?;
                let stored = decode(&blob).ok_or(StoreError::CorruptEmbedding { id })?;
                if stored.len() != query.len() {
                    return Err(StoreError::DimensionMismatch {
                        id,
                        query: query.len(),
                        stored: stored.len(),
                    });
                }
                hits.push(ScoredChunk {
                    id,
                    content,
                    score: cosine(query, &stored),
                });
            }
            Ok(hits)
        })?;

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks_exact(4)
        .map(|b| b.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
