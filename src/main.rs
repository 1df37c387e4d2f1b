use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use phase_flow::config::WorkflowConfig;
use phase_flow::llm::{Capabilities, LlmConfig, create_provider};
use phase_flow::phases::builtin_registry;
use phase_flow::store::{InMemorySessionStore, LibSqlSessionStore, SessionStore};
use phase_flow::workflow::{SessionState, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = WorkflowConfig::from_env();

    let llm_config = LlmConfig::from_env(config.default_llm_model.clone()).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...  (or PHASE_FLOW_LLM_BACKEND=openai with OPENAI_API_KEY)");
        std::process::exit(1);
    });
    let llm = create_provider(&llm_config).context("Failed to create LLM provider")?;

    // ── Session store ────────────────────────────────────────────────────
    let db_path = std::env::var("PHASE_FLOW_DB_PATH").ok();
    let store: Arc<dyn SessionStore> = match db_path.as_deref() {
        Some(path) => Arc::new(
            LibSqlSessionStore::new_local(Path::new(path))
                .await
                .with_context(|| format!("Failed to open session database at {path}"))?,
        ),
        None => Arc::new(InMemorySessionStore::new()),
    };

    let registry = builtin_registry().context("Invalid phase registry")?;

    eprintln!("🧭 phase-flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.default_llm_model);
    eprintln!("   Sessions: {}", db_path.as_deref().unwrap_or("in-memory"));
    eprintln!("   Phases: {}", registry.names().join(", "));
    eprintln!("   Type a request and press Enter. /new starts over, /quit exits.\n");

    let capabilities = Capabilities::from_provider(llm, &config);
    let engine = WorkflowEngine::new(registry, capabilities, store, config);

    let mut thread_id = new_thread_id();
    let mut awaiting_input = false;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                thread_id = new_thread_id();
                awaiting_input = false;
                eprintln!("Started new thread {thread_id}");
            }
            message => {
                let result = if awaiting_input {
                    engine.add_user_input(message, &thread_id).await
                } else {
                    engine.run_workflow(message, &thread_id).await
                };

                match result {
                    Ok(state) => {
                        awaiting_input = state.awaiting_input;
                        print_turn(&state);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Turn failed");
                        eprintln!("Error: {e}");
                    }
                }
            }
        }
        eprint!("> ");
    }

    Ok(())
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn print_turn(state: &SessionState) {
    if let Some(reply) = state.last_assistant_message() {
        println!("\n{reply}\n");
    }
    eprintln!("[status: {}]", state.status);

    for (phase, result) in &state.results {
        if let Ok(pretty) = serde_json::to_string_pretty(result) {
            eprintln!("[{phase} result]\n{pretty}");
        }
    }
}
