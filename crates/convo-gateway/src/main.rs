use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use convo_channels::ChannelManager;
use convo_core::ConvoConfig;
use convo_queue::OutboundQueue;
use convo_store::ConvoStore;
use rusqlite::Connection;
use tracing::info;

mod app;
mod cache;
mod forward;
mod http;
mod outbound_worker;

/// Channel Gateway: per-channel inbound webhooks plus the outbound delivery worker.
#[derive(Parser, Debug)]
#[command(name = "convo-gateway")]
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
                .unwrap_or_else(|_| "convo_gateway=info,tower_http=debug".into()),
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

    let queue_db = Connection::open(format!("{}.outbound", config.database.url))?;
    let outbound = OutboundQueue::new(queue_db)?;

    let mut channels = ChannelManager::new();
    if let Some(token) = config.webhook_secrets.by_channel.get("telegram_bot_token") {
        channels.register(Box::new(convo_telegram::TelegramAdapter::new(token.clone())));
    }
    if let (Some(token), Some(phone_id)) = (
        config.webhook_secrets.by_channel.get("whatsapp_access_token"),
        config.webhook_secrets.by_channel.get("whatsapp_phone_number_id"),
    ) {
        channels.register(Box::new(convo_whatsapp::WhatsAppAdapter::new(token.clone(), phone_id.clone())));
    }
    if let (Some(token), Some(account_id)) = (
        config.webhook_secrets.by_channel.get("instagram_page_access_token"),
        config.webhook_secrets.by_channel.get("instagram_ig_account_id"),
    ) {
        channels.register(Box::new(convo_instagram::InstagramAdapter::new(token.clone(), account_id.clone())));
    }
    channels.register(Box::new(convo_web::WebAdapter::new()));
    channels.connect_all().await;

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(config, store, outbound, channels));

    tokio::spawn(forward::run_retry_drain(state.clone()));
    tokio::spawn(outbound_worker::run(state.clone()));

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Channel gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
