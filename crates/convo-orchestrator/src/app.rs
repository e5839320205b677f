use std::sync::Arc;
use std::time::Duration;

use convo_core::types::{ChannelId, TenantId};
use convo_core::{ConvoConfig, ObjectStore};
use convo_llm::{AnthropicProvider, OllamaProvider, OpenAiProvider, ProviderRouter, ProviderSlot};
use convo_queue::{EventLog, OutboundQueue};
use convo_retrieval::{EmbeddingProvider, VectorStore};
use convo_store::{Channel, ConvoStore, RetrievalConfig};

use crate::cache::TtlCache;
use crate::idempotency::SeenEvents;

/// Central shared state for the request pipeline and every admin handler.
pub struct AppState {
    pub config: ConvoConfig,
    pub store: ConvoStore,
    pub outbound: OutboundQueue,
    pub events: EventLog,
    pub vector_store: Box<dyn VectorStore>,
    pub embedder: Box<dyn EmbeddingProvider>,
    /// Tried only when `embedder` fails; a distinct model so the two don't
    /// share a single point of failure. See `retrieve_context`.
    pub fallback_embedder: Box<dyn EmbeddingProvider>,
    pub object_store: Box<dyn ObjectStore>,
    pub llm: ProviderRouter,
    pub seen_events: SeenEvents,
    pub policy_cache: TtlCache<TenantId, convo_store::PolicyVersion>,
    pub retrieval_config_cache: TtlCache<TenantId, RetrievalConfig>,
    pub channel_cache: TtlCache<ChannelId, Channel>,
}

impl AppState {
    pub fn new(
        config: ConvoConfig,
        store: ConvoStore,
        outbound: OutboundQueue,
        events: EventLog,
        vector_store: Box<dyn VectorStore>,
        embedder: Box<dyn EmbeddingProvider>,
        fallback_embedder: Box<dyn EmbeddingProvider>,
        object_store: Box<dyn ObjectStore>,
    ) -> Self {
        let llm = build_provider_router(&config);
        let policy_ttl = Duration::from_secs(config.limits.policy_cache_ttl_secs);
        let channel_ttl = Duration::from_secs(config.limits.channel_cred_cache_ttl_secs);
        Self {
            seen_events: SeenEvents::new(),
            policy_cache: TtlCache::new(policy_ttl),
            retrieval_config_cache: TtlCache::new(policy_ttl),
            channel_cache: TtlCache::new(channel_ttl),
            config,
            store,
            outbound,
            events,
            vector_store,
            embedder,
            fallback_embedder,
            object_store,
            llm,
        }
    }

    /// Called after any admin mutation that changes a tenant's published
    /// policy or retrieval config, so the next inbound message re-reads
    /// the store instead of serving a stale cached value for the rest of
    /// the TTL window.
    pub fn invalidate_tenant_caches(&self, tenant_id: &TenantId) {
        self.policy_cache.invalidate(tenant_id);
        self.retrieval_config_cache.invalidate(tenant_id);
    }

    pub fn invalidate_channel(&self, channel_id: &ChannelId) {
        self.channel_cache.invalidate(channel_id);
    }
}

/// Build a failover chain from the single configured provider plus its
/// fallback model, picking the wire format from `provider_url`. Mirrors
/// the Channel Gateway's channel-type dispatch: one config surface, one
/// concrete adapter chosen at startup.
fn build_provider_router(config: &ConvoConfig) -> ProviderRouter {
    let llm = &config.llm;
    let mut slots = Vec::new();

    let primary: Box<dyn convo_llm::LlmProvider> = if llm.provider_url.contains("anthropic") {
        Box::new(AnthropicProvider::new(llm.api_key.clone(), Some(llm.provider_url.clone())))
    } else if llm.provider_url.contains("ollama") || llm.provider_url.contains("11434") {
        Box::new(OllamaProvider::new(Some(llm.provider_url.clone())))
    } else {
        Box::new(OpenAiProvider::new(llm.api_key.clone(), Some(llm.provider_url.clone())))
    };
    slots.push(ProviderSlot::new(primary, 2));

    if let Some(fallback_model) = &llm.fallback_model {
        // The fallback model is served by the same provider endpoint; only
        // the model name passed in the chat request differs, so the slot
        // wraps a provider built the same way with no separate base_url,
        // but overrides `ChatRequest.model` to `fallback_model` so the
        // retry actually hits a different model rather than repeating the
        // primary's request verbatim.
        let fallback: Box<dyn convo_llm::LlmProvider> = if llm.provider_url.contains("anthropic") {
            Box::new(AnthropicProvider::new(llm.api_key.clone(), Some(llm.provider_url.clone())))
        } else if llm.provider_url.contains("ollama") || llm.provider_url.contains("11434") {
            Box::new(OllamaProvider::new(Some(llm.provider_url.clone())))
        } else {
            Box::new(OpenAiProvider::new(llm.api_key.clone(), Some(llm.provider_url.clone())))
        };
        slots.push(ProviderSlot::with_model(fallback, 1, fallback_model.clone()));
    }

    ProviderRouter::new(slots)
}

pub fn build_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route(
            "/v1/messages/inbound",
            axum::routing::post(crate::http::inbound::inbound_handler),
        )
        .nest("/admin", crate::http::admin::router())
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
