//! `fn_ingest`: load a document into the knowledge store

use super::{Tool, ToolContext, ToolError};
use crate::knowledge::IngestionService;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct IngestTool {
    ingestion: Arc<dyn IngestionService>,
}

impl IngestTool {
    pub fn new(ingestion: Arc<dyn IngestionService>) -> Self {
        Self { ingestion }
    }
}

#[derive(Debug, Deserialize)]
struct IngestInput {
    file_path: String,
}

#[async_trait]
impl Tool for IngestTool {
    fn name(&self) -> &'static str {
        "fn_ingest"
    }

    fn description(&self) -> String {
        "Ingest PDF documents and store embeddings".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["file_path"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the document to ingest"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, ToolError> {
        let input: IngestInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        tracing::info!(
            conv_id = %ctx.conversation_id,
            id = %ctx.tool_call_id,
            path = %input.file_path,
            "Ingesting document"
        );
        let report = self.ingestion.ingest(&input.file_path).await?;

        Ok(json!({
            "status": "success",
            "message": format!("Ingested: {}", input.file_path),
            "chunks": report.chunk_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{IngestReport, IngestionError};
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    struct FakeIngestion;

    #[async_trait]
    impl IngestionService for FakeIngestion {
        async fn ingest(&self, source: &str) -> Result<IngestReport, IngestionError> {
            if source == "missing.pdf" {
                Err(IngestionError::SourceNotFound(PathBuf::from(source)))
            } else {
                Ok(IngestReport { chunk_count: 4 })
            }
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new(), "conv".into(), "call_1".into())
    }

    #[tokio::test]
    async fn test_success_payload() {
        let tool = IngestTool::new(Arc::new(FakeIngestion));
        let out = tool
            .run(json!({"file_path": "paper.pdf"}), ctx())
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({"status": "success", "message": "Ingested: paper.pdf", "chunks": 4})
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let tool = IngestTool::new(Arc::new(FakeIngestion));
        let err = tool
            .run(json!({"file_path": "missing.pdf"}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Ingestion(IngestionError::SourceNotFound(_))
        ));
        assert!(err.to_string().contains("missing.pdf"));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let tool = IngestTool::new(Arc::new(FakeIngestion));
        assert!(matches!(
            tool.run(json!({}), ctx()).await,
            Err(ToolError::InvalidInput(_))
        ));
    }
}
