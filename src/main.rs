//! RAG agent REPL
//!
//! Reads one user message per line and prints the agent's answer.

use rag_agent::config::Config;
use rag_agent::conversation::Conversation;
use rag_agent::dialogue::{DialogueError, DialogueLoop, ExchangeOutcome, LoopNotice};
use rag_agent::knowledge::{ChunkStore, KnowledgeBase, OpenAIEmbedder};
use rag_agent::llm;
use rag_agent::system_prompt::build_system_prompt;
use rag_agent::tools::ToolRegistry;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "bye"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; the variables may come from the environment
    let _ = dotenvy::dotenv();

    // Initialize logging on stderr so stdout carries only the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_agent=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;
    let db_path = config.db_path();
    tracing::info!(
        model = %config.model,
        transport = ?config.transport,
        store = %db_path.display(),
        "Configuration loaded"
    );

    let store = ChunkStore::open(&db_path)?;
    let embedder = Arc::new(OpenAIEmbedder::new(
        config.api_key.clone(),
        config.embedding_model.clone(),
        &config.base_url,
    )?);
    let knowledge = Arc::new(KnowledgeBase::new(store, embedder));
    let tools = Arc::new(ToolRegistry::standard(knowledge.clone(), knowledge)?);
    let service = llm::build_service(&config)?;

    let dialogue = DialogueLoop::new(service, tools.clone(), config.loop_config());
    let mut conversation = Conversation::new(build_system_prompt(&tools));
    let conv_id = conversation.id().to_string();
    tracing::info!(
        conv_id = %conv_id,
        created_at = %conversation.created_at().to_rfc3339(),
        "Session started"
    );
    let mut notices = dialogue.subscribe();

    println!("Agent ready");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.iter().any(|c| text.eq_ignore_ascii_case(c)) {
            break;
        }

        let cancel = CancellationToken::new();
        let exchange = dialogue.run_exchange(&mut conversation, text, &cancel);
        tokio::pin!(exchange);

        let result = loop {
            tokio::select! {
                result = &mut exchange => break result,
                notice = notices.recv() => print_notice(notice),
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    tracing::info!(conv_id = %conv_id, "Cancelling exchange");
                    cancel.cancel();
                }
            }
        };
        while let Ok(notice) = notices.try_recv() {
            print_notice(Ok(notice));
        }

        print_result(&result);
    }

    println!("Goodbye!");
    Ok(())
}

fn print_notice(notice: Result<LoopNotice, broadcast::error::RecvError>) {
    match notice {
        Ok(LoopNotice::ToolStarted { name, .. }) => println!("Calling tool: {name}"),
        Ok(_) => {}
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Dropped progress notices");
        }
        Err(broadcast::error::RecvError::Closed) => {}
    }
}

fn print_result(result: &Result<ExchangeOutcome, DialogueError>) {
    match result {
        Ok(outcome) => {
            println!("Bot: {}", outcome.answer);
            if outcome.is_degraded() {
                println!(
                    "(note: {} of {} tool calls failed; the answer may be incomplete)",
                    outcome.tool_failures, outcome.tool_calls
                );
            }
        }
        Err(e) => println!("Bot: {}", e.user_message()),
    }
}
