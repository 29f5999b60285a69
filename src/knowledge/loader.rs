//! Document loading by file extension

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported document type: {0:?}")]
    Unsupported(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Read a document into plain text. PDFs are parsed on a blocking thread.
pub async fn load_document(path: &Path) -> Result<String, LoadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(LoadError::NotFound(path.to_path_buf())),
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || extract_pdf(&owned))
                .await
                .map_err(|e| LoadError::Pdf(format!("extraction task failed: {e}")))?
        }
        "txt" | "md" => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            }),
        other => Err(LoadError::Unsupported(other.to_string())),
    }
}

fn extract_pdf(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    // pdf-extract can panic on malformed fonts
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    })) {
        Ok(Ok(text)) => {
            tracing::debug!(path = %path.display(), chars = text.len(), "Extracted PDF text");
            Ok(text)
        }
        Ok(Err(e)) => Err(LoadError::Pdf(e.to_string())),
        Err(_) => {
            tracing::error!(path = %path.display(), "PDF extraction panicked");
            Err(LoadError::Pdf("parser panicked on malformed document".to_string()))
        }
    }
}
