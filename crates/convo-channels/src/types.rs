use chrono::{DateTime, Utc};
use convo_core::{BrandId, ChannelId, CorrelationId, EventId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical inbound message after channel-specific normalization.
///
/// Field set is fixed by the wire contract: `POST /v1/messages/inbound`
/// accepts exactly this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Idempotency key for deduplication; supplied by the originating channel
    /// (or synthesized by the Gateway when the provider has none).
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub brand_id: BrandId,
    pub channel_id: ChannelId,
    /// Platform-native identifier for the sender (chat id, PSID, wa_id, ...).
    pub sender_id: String,
    pub message: String,
    pub locale: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

/// A record published to the outbound stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub delivery_id: String,
    pub channel_id: ChannelId,
    pub external_sender_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Incremented on each redelivery attempt by the outbound worker.
    #[serde(default)]
    pub attempt: u32,
    pub format: MessageFormat,
    pub correlation_id: Option<CorrelationId>,
}

impl OutboundMessage {
    /// Partition key enforcing per-sender ordering.
    pub fn partition_key(&self) -> String {
        format!("{}:{}", self.channel_id, self.external_sender_id)
    }
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    PlainText,
    Markdown,
    Html,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
