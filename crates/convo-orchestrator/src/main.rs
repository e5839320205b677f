use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use convo_core::config::EmbeddingProviderChoice;
use convo_core::{ConvoConfig, FsObjectStore};
use convo_queue::{EventLog, OutboundQueue};
use convo_retrieval::{EmbeddingProvider, FastEmbedProvider, LanceVectorStore};
use convo_store::ConvoStore;
use rusqlite::Connection;
use tracing::info;

mod app;
mod cache;
mod error;
mod http;
mod idempotency;
mod pipeline;
mod policy;

/// Orchestrator pipeline: conversation upsert, policy evaluation, retrieval,
/// LLM call, guardrails, outbound publish.
#[derive(Parser, Debug)]
#[command(name = "convo-orchestrator")]
struct Cli {
    /// Path to a TOML config file. Falls back to `CONVO_CONFIG` env var, then
    /// component defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convo_orchestrator=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("CONVO_CONFIG").ok());
    let config = ConvoConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::error!("config load failed: {}", e);
        std::process::exit(1);
    });

    let db = Connection::open(&config.database.url)?;
    let store = ConvoStore::new(db)?;

    let outbound_db = Connection::open(format!("{}.outbound", config.database.url))?;
    let outbound = OutboundQueue::new(outbound_db)?;

    let events_db = Connection::open(format!("{}.events", config.database.url))?;
    let events = EventLog::new(events_db)?;

    let vector_store = LanceVectorStore::connect(&config.vector_store.url).await?;
    let (embedder, fallback_embedder): (Box<dyn EmbeddingProvider>, Box<dyn EmbeddingProvider>) =
        match config.embedding.provider {
            EmbeddingProviderChoice::Primary => {
                (Box::new(FastEmbedProvider::new()?), Box::new(FastEmbedProvider::new_fallback()?))
            }
            EmbeddingProviderChoice::Fallback => {
                (Box::new(FastEmbedProvider::new_fallback()?), Box::new(FastEmbedProvider::new()?))
            }
        };
    let object_store = FsObjectStore::new(config.object_store.local_root());

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(
        config,
        store,
        outbound,
        events,
        Box::new(vector_store),
        embedder,
        fallback_embedder,
        Box::new(object_store),
    ));

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
