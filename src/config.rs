//! Runtime configuration from environment variables

use crate::dialogue::LoopConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Which completion binding to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Stateless chat completions
    Chat,
    /// Provider-side threads and runs
    Assistants,
}

impl FromStr for Transport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "assistants" => Ok(Self::Assistants),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub store_dir: PathBuf,
    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
    pub transport: Transport,
    pub max_round_trips: u32,
    pub completion_timeout: Duration,
    pub tool_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;
        if !api_key.starts_with("sk-") {
            tracing::warn!("OPENAI_API_KEY does not start with 'sk-'; continuing anyway");
        }

        Ok(Self {
            api_key,
            store_dir: get("RAG_STORE_DIR").map_or_else(|| PathBuf::from("./store"), PathBuf::from),
            model: get("RAG_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: get("RAG_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport: parse_or("RAG_TRANSPORT", get("RAG_TRANSPORT"), Transport::Chat)?,
            max_round_trips: parse_or("RAG_MAX_ROUND_TRIPS", get("RAG_MAX_ROUND_TRIPS"), 10)?,
            completion_timeout: Duration::from_secs(parse_or(
                "RAG_COMPLETION_TIMEOUT_SECS",
                get("RAG_COMPLETION_TIMEOUT_SECS"),
                120,
            )?),
            tool_timeout: Duration::from_secs(parse_or(
                "RAG_TOOL_TIMEOUT_SECS",
                get("RAG_TOOL_TIMEOUT_SECS"),
                120,
            )?),
            poll_interval: Duration::from_millis(parse_or(
                "RAG_POLL_INTERVAL_MS",
                get("RAG_POLL_INTERVAL_MS"),
                500,
            )?),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_dir.join("chunks.db")
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            model_id: self.model.clone(),
            max_round_trips: self.max_round_trips,
            completion_timeout: self.completion_timeout,
            tool_timeout: self.tool_timeout,
            ..LoopConfig::default()
        }
    }
}

fn parse_or<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
