use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use clap::Parser;
use convo_core::{ConvoConfig, FsObjectStore};
use convo_queue::EventLog;
use convo_retrieval::{FastEmbedProvider, LanceVectorStore};
use convo_store::ConvoStore;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

mod chunk;
mod error;
mod pipeline;

use pipeline::IngestionState;

/// Ingestion worker: claims knowledge-asset jobs, chunks, embeds, and indexes them.
#[derive(Parser, Debug)]
#[command(name = "convo-ingestion")]
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
                .unwrap_or_else(|_| "convo_ingestion=info".into()),
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

    let events_db = Connection::open(format!("{}.events", config.database.url))?;
    let events = EventLog::new(events_db)?;

    let vector_store = LanceVectorStore::connect(&config.vector_store.url).await?;
    let embedder = FastEmbedProvider::new()?;
    let object_store = FsObjectStore::new(config.object_store.local_root());

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(IngestionState {
        store,
        events,
        vector_store: Box::new(vector_store),
        embedder: Box::new(embedder),
        object_store: Box::new(object_store),
    });

    tokio::spawn(pipeline::run(state.clone()));

    let router = Router::new().route("/health", get(health_handler)).with_state(state);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Ingestion worker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// GET /health — liveness probe. The worker loop runs independently of this
/// server; this endpoint only confirms the process is up.
async fn health_handler(State(_state): State<Arc<IngestionState>>) -> Json<Value> {
    Json(json!({"status": "ok"}))
}
