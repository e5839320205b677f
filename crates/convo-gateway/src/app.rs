use std::sync::Arc;
use std::time::Duration;

use convo_channels::ChannelManager;
use convo_core::types::ChannelId;
use convo_core::ConvoConfig;
use convo_queue::OutboundQueue;
use convo_store::{Channel, ConvoStore};

use crate::cache::TtlCache;
use crate::forward::RetryBuffer;

/// Central shared state, passed as `Arc<AppState>` to every Axum handler and
/// to the outbound delivery worker.
pub struct AppState {
    pub config: ConvoConfig,
    pub store: ConvoStore,
    pub outbound: OutboundQueue,
    pub channels: ChannelManager,
    pub http: reqwest::Client,
    pub retry_buffer: RetryBuffer,
    pub channel_cache: TtlCache<ChannelId, Channel>,
}

impl AppState {
    pub fn new(
        config: ConvoConfig,
        store: ConvoStore,
        outbound: OutboundQueue,
        channels: ChannelManager,
    ) -> Self {
        let channel_ttl = Duration::from_secs(config.limits.channel_cred_cache_ttl_secs);
        Self {
            config,
            store,
            outbound,
            channels,
            http: reqwest::Client::new(),
            retry_buffer: RetryBuffer::new(),
            channel_cache: TtlCache::new(channel_ttl),
        }
    }

    /// Loads a channel's credentials, serving a cached copy when fresh.
    /// Called on every inbound webhook and every outbound delivery tick.
    pub async fn get_channel_cached(&self, channel_id: &ChannelId) -> Result<Channel, convo_store::StoreError> {
        self.channel_cache
            .get_or_try_insert_with(channel_id.clone(), || async { self.store.get_channel(channel_id) })
            .await
    }

    /// Called after an admin-triggered secret rotation so the next webhook
    /// or delivery tick re-reads the store instead of serving the old secret
    /// for the rest of the TTL window.
    pub fn invalidate_channel(&self, channel_id: &ChannelId) {
        self.channel_cache.invalidate(channel_id);
    }
}

pub fn build_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route(
            "/webhooks/{channel}/{channel_id}",
            axum::routing::get(crate::http::webhooks::webhook_handshake)
                .post(crate::http::webhooks::webhook_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
