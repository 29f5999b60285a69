//! RAG agent
//!
//! A tool-calling dialogue loop over a local knowledge base: the model asks
//! for documents to be ingested or chunks to be retrieved, and answers from
//! what comes back.

pub mod config;
pub mod conversation;
pub mod dialogue;
pub mod knowledge;
pub mod llm;
pub mod system_prompt;
pub mod tools;
