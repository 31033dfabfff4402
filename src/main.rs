//! Agent chat server
//!
//! Serves the chat stream endpoint and chat storage over HTTP.

use agent_chat::api::{create_router, AppState};
use agent_chat::config::AppConfig;
use agent_chat::graph::{AgentGraph, GraphConfig, MemoryCheckpointStore};
use agent_chat::llm::{LlmService, LoggingService, OpenAiCompatService, RetryingService};
use agent_chat::store::SqliteStore;
use agent_chat::system_prompt::build_system_prompt;
use agent_chat::tools::{ToolBackend, ToolRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let backend =
        OpenAiCompatService::new(&config.llm.api_key, &config.llm.model, Some(config.llm.base_url.as_str()))?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(RetryingService::new(
        Arc::new(backend),
        config.llm.max_retries,
    ))));
    tracing::info!(model = %llm.model_id(), base_url = %config.llm.base_url, "LLM backend ready");

    let tools = Arc::new(ToolRegistry::standard());
    let system_prompt = build_system_prompt(config.system_prompt_path.as_deref(), &tools.list_tools())?;

    if config.auth.is_empty() {
        tracing::warn!("No AUTH_TOKENS configured; every request will be rejected");
    }

    let graph = AgentGraph::new(
        llm,
        tools,
        Arc::new(MemoryCheckpointStore::new()),
        GraphConfig {
            system_prompt,
            trim_max_messages: config.agent.trim_max_messages,
            max_tokens: Some(config.llm.max_tokens),
            temperature: Some(config.llm.temperature),
            max_steps: config.agent.max_steps,
        },
    );
    let state = AppState::new(graph, store, Arc::new(config.auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Agent chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
