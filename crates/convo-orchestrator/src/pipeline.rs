//! The inbound message pipeline: dedup, conversation upsert, policy
//! resolution, retrieval, the LLM call, guardrails, persistence, and
//! publish — in that order, each stage feeding the next.
//!
//! A request's deadline is a single `tokio::time::timeout` wrapped around
//! the LLM call, the one stage whose latency is not bounded by a local
//! database. Every earlier stage is expected to be fast enough that the
//! deadline budget is spent almost entirely downstream.

use std::sync::Arc;
use std::time::Duration;

use convo_channels::InboundMessage;
use convo_core::types::{ChannelId, ConversationId, CorrelationId, DeliveryId, TenantId};
use convo_guardrails::rules::{EscalationHeuristic, PiiLeakScan, PolicySafetyCheck, ProfanityFilter};
use convo_guardrails::{GuardrailContext, GuardrailDefinition, GuardrailEngine};
use convo_llm::{ChatRequest, LlmProvider, Message, Role};
use convo_queue::{DomainEvent, OutboundRecord};
use convo_retrieval::{EmbeddingProvider, VectorStore};
use convo_store::{Direction, PolicyVersion, RetrievalConfig};
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::PipelineError;
use crate::idempotency::InboundOutcome;
use crate::policy;

const LAST_N_TURNS: u32 = 6;
/// Retrieval queries twice the final document budget so hybrid scoring has
/// something to discard; a tighter vector-store limit would let the lexical
/// half of the score starve candidates the dense pass ranked just outside it.
const RETRIEVAL_FETCH_MULTIPLIER: usize = 2;

pub struct ProcessResult {
    pub conversation_id: ConversationId,
    pub delivery_id: DeliveryId,
}

pub async fn process_inbound(
    state: &Arc<AppState>,
    msg: &InboundMessage,
    correlation_id: &CorrelationId,
) -> Result<ProcessResult, PipelineError> {
    if let Some(outcome) = state.seen_events.lookup(&msg.event_id) {
        info!(event_id = %msg.event_id, "duplicate inbound event, returning cached outcome");
        return Ok(ProcessResult {
            conversation_id: outcome.conversation_id,
            delivery_id: outcome.delivery_id,
        });
    }

    let channel = resolve_channel(state, &msg.channel_id).await?;
    if !channel.active || channel.tenant_id != msg.tenant_id || channel.brand_id != msg.brand_id {
        return Err(PipelineError::Validation("channel does not match tenant/brand".into()));
    }

    let (conversation, _inbound_log) = state.store.upsert_conversation_and_log(
        &msg.tenant_id,
        &msg.brand_id,
        &msg.channel_id,
        &msg.sender_id,
        Direction::In,
        &msg.message,
        msg.metadata.clone(),
        Some(correlation_id.as_str()),
    )?;

    let policy = resolve_policy(state, &msg.tenant_id).await?;
    let retrieval_config = resolve_retrieval_config(state, &msg.tenant_id).await?;

    let (context, context_degraded) = retrieve_context(state, msg, &retrieval_config).await;

    let history = state.store.recent_messages(&conversation.id, LAST_N_TURNS)?;

    let deadline = Duration::from_millis(state.config.limits.request_deadline_ms);
    let chat_response = tokio::time::timeout(deadline, call_llm(state, &policy, &context, &history, &msg.message))
        .await
        .map_err(|_| PipelineError::DeadlineExceeded)??;

    let low_confidence = context.is_empty() && !context_degraded.is_empty();

    let guardrails = build_guardrail_engine(&policy);
    let verdict = guardrails.run(GuardrailContext {
        tenant_id: msg.tenant_id.as_str().to_string(),
        conversation_id: conversation.id.as_str().to_string(),
        content: chat_response.content.clone(),
        fallback_copy: policy::fallback_copy(&policy),
        low_confidence,
    });

    if verdict.escalated {
        let _ = state.store.audit(
            Some(msg.tenant_id.as_str()),
            "orchestrator",
            "conversation.escalated",
            json!({"conversation_id": conversation.id.as_str()}),
        );
    }

    let outbound_metadata = serde_json::from_value(json!({
        "provider": chat_response.model,
        "tokens_in": chat_response.tokens_in,
        "tokens_out": chat_response.tokens_out,
        "context_degraded": !context_degraded.is_empty(),
        "escalated": verdict.escalated,
    }))
    .unwrap_or_default();

    let outbound_log = state.store.append_outbound_message(
        &conversation.id,
        &verdict.content,
        outbound_metadata,
        Some(correlation_id.as_str()),
    )?;
    let _ = outbound_log;

    let delivery_id = DeliveryId::new();
    state.outbound.publish(&OutboundRecord {
        delivery_id: delivery_id.clone(),
        channel_id: msg.channel_id.clone(),
        external_sender_id: msg.sender_id.clone(),
        content: verdict.content,
        metadata: Default::default(),
        attempt: 0,
        correlation_id: Some(correlation_id.clone()),
    })?;

    let _ = state.events.publish(&DomainEvent {
        name: "message.replied".to_string(),
        tenant_id: msg.tenant_id.as_str().to_string(),
        payload: json!({"conversation_id": conversation.id.as_str(), "escalated": verdict.escalated}),
    });

    let outcome = InboundOutcome { conversation_id: conversation.id.clone(), delivery_id: delivery_id.clone() };
    state.seen_events.record(msg.event_id.clone(), outcome);

    Ok(ProcessResult { conversation_id: conversation.id, delivery_id })
}

async fn resolve_channel(
    state: &Arc<AppState>,
    channel_id: &ChannelId,
) -> Result<convo_store::Channel, PipelineError> {
    state
        .channel_cache
        .get_or_try_insert_with(channel_id.clone(), || async {
            state.store.get_channel(channel_id).map_err(PipelineError::from)
        })
        .await
}

async fn resolve_policy(state: &Arc<AppState>, tenant_id: &TenantId) -> Result<PolicyVersion, PipelineError> {
    state
        .policy_cache
        .get_or_try_insert_with(tenant_id.clone(), || async {
            match state.store.get_published_policy(tenant_id)? {
                Some(p) => Ok(p),
                None => Ok(policy::default_policy()),
            }
        })
        .await
}

async fn resolve_retrieval_config(
    state: &Arc<AppState>,
    tenant_id: &TenantId,
) -> Result<RetrievalConfig, PipelineError> {
    state
        .retrieval_config_cache
        .get_or_try_insert_with(tenant_id.clone(), || async {
            state.store.get_retrieval_config(tenant_id).map_err(PipelineError::from)
        })
        .await
}

/// Returns the selected context chunks, plus a non-empty degraded reason
/// when embedding failed and the pipeline fell through to an empty
/// context rather than aborting the request.
async fn retrieve_context(
    state: &Arc<AppState>,
    msg: &InboundMessage,
    retrieval_config: &RetrievalConfig,
) -> (Vec<convo_retrieval::SelectedChunk>, String) {
    let embedding = match state.embedder.embed_one(&msg.message).await {
        Ok(e) => e,
        Err(primary_err) => {
            warn!(error = %primary_err, "primary embedding provider failed, trying fallback");
            match state.fallback_embedder.embed_one(&msg.message).await {
                Ok(e) => e,
                Err(fallback_err) => {
                    warn!(error = %fallback_err, "fallback embedding provider also failed, proceeding with empty context");
                    return (Vec::new(), fallback_err.to_string());
                }
            }
        }
    };

    let fetch_limit = (retrieval_config.max_documents as usize) * RETRIEVAL_FETCH_MULTIPLIER;
    let chunks = match state
        .vector_store
        .query(&msg.tenant_id, &msg.brand_id, &embedding, fetch_limit.max(1))
        .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "vector store query failed, proceeding with empty context");
            return (Vec::new(), e.to_string());
        }
    };

    (convo_retrieval::select(&msg.message, chunks, retrieval_config), String::new())
}

async fn call_llm(
    state: &Arc<AppState>,
    policy: &PolicyVersion,
    context: &[convo_retrieval::SelectedChunk],
    history: &[convo_store::MessageLog],
    current_message: &str,
) -> Result<convo_llm::ChatResponse, PipelineError> {
    let mut system = policy::persona(policy);
    if !context.is_empty() {
        system.push_str("\n\nContext:\n");
        for (i, chunk) in context.iter().enumerate() {
            system.push_str(&format!("{}. {}\n", i + 1, chunk.text));
        }
    }

    let mut messages: Vec<Message> = history
        .iter()
        .map(|m| Message {
            role: if m.direction == Direction::In { Role::User } else { Role::Assistant },
            content: m.content.clone(),
        })
        .collect();
    messages.push(Message { role: Role::User, content: current_message.to_string() });

    let req = ChatRequest {
        model: state.config.llm.model.clone(),
        system,
        messages,
        max_tokens: 1024,
    };

    state.llm.send(&req).await.map_err(PipelineError::from)
}

fn build_guardrail_engine(policy: &PolicyVersion) -> GuardrailEngine {
    let engine = GuardrailEngine::new();
    engine.register(GuardrailDefinition::new("pii_leak_scan", std::sync::Arc::new(PiiLeakScan)).with_priority(0));
    engine.register(
        GuardrailDefinition::new("profanity_filter", std::sync::Arc::new(ProfanityFilter::default()))
            .with_priority(1),
    );
    engine.register(
        GuardrailDefinition::new(
            "policy_safety_check",
            std::sync::Arc::new(PolicySafetyCheck::from_policy_json(&policy.policy_json)),
        )
        .with_priority(2),
    );
    engine.register(
        GuardrailDefinition::new("escalation_heuristic", std::sync::Arc::new(EscalationHeuristic))
            .with_priority(3),
    );
    engine
}
