//! System prompt construction
//!
//! The prompt names every registered tool so the model only asks for tools
//! the registry can resolve.

use crate::tools::ToolRegistry;
use std::fmt::Write;

/// Base system prompt establishing the agent's role
const BASE_PROMPT: &str = r#"You are a retrieval-augmented assistant. Answer questions using the documents the user has loaded.

Use the tools strictly as required:
- fn_ingest loads a document (PDF, plain text or Markdown) into the knowledge base
- fn_retrieve fetches the chunks most relevant to a query

Always ground your answers in retrieved chunks. If the answer cannot be found in them, say "I don't know"."#;

/// Build the system turn for a conversation backed by `registry`
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    let names = registry.names();
    if !names.is_empty() {
        prompt.push_str("\n\n<available_tools>\n");
        for name in names {
            let _ = writeln!(prompt, "- {name}");
        }
        prompt.push_str("</available_tools>");
    }

    prompt
}
