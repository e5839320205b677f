//! Webhook ingress — `GET|POST /webhooks/{channel}/{channel_id}`.
//!
//! `channel_id` is the unique per-account callback path every provider
//! issues one of (a Telegram bot's webhook URL, a WhatsApp/Instagram app's
//! subscribed callback URL), so the channel row — and with it tenant_id and
//! brand_id — is resolved from the path rather than trusted from the body.
//! POST carries the provider's own wire format (see the per-channel payload
//! types below), authenticated by an `X-<Channel>-Signature` header; GET is
//! the provider handshake (`hub.challenge`) some channels require.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use convo_channels::InboundMessage;
use convo_core::types::{ChannelId, ChannelType, CorrelationId, EventId};

use crate::app::AppState;

/// Fields every provider envelope is normalized down to, before tenant_id,
/// brand_id and channel_id (known from the channel row, not the payload)
/// are attached to build the canonical `InboundMessage`.
struct NormalizedInbound {
    event_id: String,
    sender_id: String,
    message: String,
    locale: Option<String>,
    metadata: HashMap<String, Value>,
    occurred_at: DateTime<Utc>,
}

/// The `web` channel is first-party: our own widget posts this shape
/// directly, so there is no provider envelope to translate.
#[derive(Debug, Deserialize)]
struct WebPayload {
    event_id: String,
    sender_id: String,
    message: String,
    locale: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    occurred_at: DateTime<Utc>,
}

fn map_web(body: &[u8]) -> Result<NormalizedInbound, &'static str> {
    let p: WebPayload = serde_json::from_slice(body).map_err(|_| "invalid JSON body")?;
    Ok(NormalizedInbound {
        event_id: p.event_id,
        sender_id: p.sender_id,
        message: p.message,
        locale: p.locale,
        metadata: p.metadata,
        occurred_at: p.occurred_at,
    })
}

/// Telegram Bot API `Update` — https://core.telegram.org/bots/api#update.
/// Only the subset needed to extract a text message is modeled; non-text
/// updates (edited_message, callback_query, ...) are rejected upstream.
#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    text: Option<String>,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

fn map_telegram(body: &[u8]) -> Result<NormalizedInbound, &'static str> {
    let update: TelegramUpdate = serde_json::from_slice(body).map_err(|_| "invalid JSON body")?;
    let message = update.message.ok_or("update carries no message")?;
    let text = message.text.ok_or("non-text telegram update")?;
    let sender_id = message.from.map(|u| u.id.to_string()).unwrap_or_default();
    Ok(NormalizedInbound {
        event_id: format!("telegram-{}-{}", update.update_id, message.message_id),
        sender_id,
        message: text,
        locale: None,
        metadata: HashMap::new(),
        occurred_at: DateTime::from_timestamp(message.date, 0).unwrap_or_else(Utc::now),
    })
}

/// Instagram Messenger platform webhook —
/// https://developers.facebook.com/docs/messenger-platform/webhooks.
#[derive(Debug, Deserialize)]
struct InstagramWebhook {
    entry: Vec<InstagramEntry>,
}

#[derive(Debug, Deserialize)]
struct InstagramEntry {
    #[serde(default)]
    messaging: Vec<InstagramMessaging>,
}

#[derive(Debug, Deserialize)]
struct InstagramMessaging {
    sender: InstagramUser,
    timestamp: i64,
    message: Option<InstagramMessageBody>,
}

#[derive(Debug, Deserialize)]
struct InstagramUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InstagramMessageBody {
    mid: String,
    text: Option<String>,
}

fn map_instagram(body: &[u8]) -> Result<NormalizedInbound, &'static str> {
    let webhook: InstagramWebhook = serde_json::from_slice(body).map_err(|_| "invalid JSON body")?;
    let event = webhook
        .entry
        .into_iter()
        .flat_map(|e| e.messaging)
        .next()
        .ok_or("entry carries no messaging event")?;
    let body = event.message.ok_or("messaging event carries no message")?;
    let text = body.text.ok_or("non-text instagram message")?;
    Ok(NormalizedInbound {
        event_id: body.mid,
        sender_id: event.sender.id,
        message: text,
        locale: None,
        metadata: HashMap::new(),
        occurred_at: DateTime::from_timestamp(event.timestamp / 1000, 0).unwrap_or_else(Utc::now),
    })
}

/// WhatsApp Cloud API webhook —
/// https://developers.facebook.com/docs/whatsapp/cloud-api/webhooks.
#[derive(Debug, Deserialize)]
struct WhatsAppWebhook {
    entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppEntry {
    #[serde(default)]
    changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppChange {
    value: WhatsAppValue,
}

#[derive(Debug, Deserialize)]
struct WhatsAppValue {
    #[serde(default)]
    messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppMessage {
    from: String,
    id: String,
    timestamp: String,
    text: Option<WhatsAppText>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppText {
    body: String,
}

fn map_whatsapp(body: &[u8]) -> Result<NormalizedInbound, &'static str> {
    let webhook: WhatsAppWebhook = serde_json::from_slice(body).map_err(|_| "invalid JSON body")?;
    let message = webhook
        .entry
        .into_iter()
        .flat_map(|e| e.changes)
        .flat_map(|c| c.value.messages)
        .next()
        .ok_or("change carries no messages")?;
    let text = message.text.ok_or("non-text whatsapp message")?;
    let occurred_at = message
        .timestamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);
    Ok(NormalizedInbound {
        event_id: message.id,
        sender_id: message.from,
        message: text.body,
        locale: None,
        metadata: HashMap::new(),
        occurred_at,
    })
}

fn normalize(channel_type: ChannelType, body: &[u8]) -> Result<NormalizedInbound, &'static str> {
    match channel_type {
        ChannelType::Web => map_web(body),
        ChannelType::Telegram => map_telegram(body),
        ChannelType::Instagram => map_instagram(body),
        ChannelType::Whatsapp => map_whatsapp(body),
    }
}

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

/// GET /webhooks/:channel/:channel_id — echo the provider's handshake
/// challenge verbatim.
pub async fn webhook_handshake(
    Path((channel, _channel_id)): Path<(String, String)>,
    Query(q): Query<HandshakeQuery>,
) -> impl IntoResponse {
    match q.hub_challenge {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => {
            warn!(channel = %channel, "webhook handshake missing hub.challenge");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// POST /webhooks/:channel/:channel_id
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path((channel, channel_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let channel_type = ChannelType::from_str(&channel).map_err(|_| {
        warn!(channel = %channel, "unknown channel type");
        err(StatusCode::NOT_FOUND, "unknown channel")
    })?;

    let channel_id = ChannelId::from(channel_id);
    let channel_row = state
        .get_channel_cached(&channel_id)
        .await
        .map_err(|_| err(StatusCode::NOT_FOUND, "unknown channel"))?;

    if !channel_row.active || channel_row.channel_type != channel_type {
        warn!(channel = %channel, "channel disabled or type mismatch");
        return Err(err(StatusCode::NOT_FOUND, "unknown or disabled channel"));
    }

    let sig_header_name = format!("x-{}-signature", channel);
    let signature = headers
        .get(sig_header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing signature header"))?;

    let expected_hex = hmac_sha256_hex(&channel_row.hmac_secret, &body);
    let previous_ok = channel_row
        .previous_hmac_secret
        .as_deref()
        .map(|s| hmac_sha256_hex(s, &body))
        .map(|h| within_grace(&channel_row) && constant_time_eq(&h, signature))
        .unwrap_or(false);

    if !constant_time_eq(&expected_hex, signature) && !previous_ok {
        let _ = state.store.audit(
            Some(channel_row.tenant_id.as_str()),
            "gateway",
            "auth.signature_mismatch",
            json!({"channel_id": channel_id.as_str()}),
        );
        warn!(channel = %channel, "webhook signature mismatch");
        return Err(err(StatusCode::UNAUTHORIZED, "signature mismatch"));
    }

    let normalized = normalize(channel_type, &body).map_err(|reason| {
        warn!(channel = %channel, reason, "failed to normalize provider payload");
        err(StatusCode::BAD_REQUEST, reason)
    })?;

    let correlation_id = CorrelationId::from_header_or_new(
        headers.get("x-request-id").and_then(|v| v.to_str().ok()),
    );

    let msg = InboundMessage {
        event_id: EventId::from(normalized.event_id),
        tenant_id: channel_row.tenant_id.clone(),
        brand_id: channel_row.brand_id.clone(),
        channel_id,
        sender_id: normalized.sender_id,
        message: normalized.message,
        locale: normalized.locale,
        metadata: normalized.metadata,
        occurred_at: normalized.occurred_at,
    };

    match crate::forward::forward_inbound(state.as_ref(), &msg, &correlation_id).await {
        Ok(()) => {
            info!(event_id = %msg.event_id, "webhook forwarded");
            Ok(StatusCode::ACCEPTED)
        }
        Err(crate::forward::ForwardError::Buffered) => {
            info!(event_id = %msg.event_id, "webhook buffered locally for retry");
            Ok(StatusCode::ACCEPTED)
        }
        Err(crate::forward::ForwardError::BufferFull) => {
            warn!(event_id = %msg.event_id, "local retry buffer full");
            Err(err(StatusCode::SERVICE_UNAVAILABLE, "retry buffer full"))
        }
    }
}

fn within_grace(channel_row: &convo_store::Channel) -> bool {
    channel_row
        .secret_grace_until
        .map(|until| Utc::now() <= until)
        .unwrap_or(false)
}

fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn err(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message})))
}
