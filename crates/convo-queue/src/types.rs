use std::collections::HashMap;

use convo_core::types::{ChannelId, CorrelationId, DeliveryId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record in the outbound delivery stream. Dedup key is `delivery_id`,
/// ordering key is `(channel_id, external_sender_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub delivery_id: DeliveryId,
    pub channel_id: ChannelId,
    pub external_sender_id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub attempt: u32,
    pub correlation_id: Option<CorrelationId>,
}

impl OutboundRecord {
    pub fn partition_key(&self) -> String {
        format!("{}:{}", self.channel_id, self.external_sender_id)
    }
}

/// A domain event published for automation's event-trigger rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub name: String,
    pub tenant_id: String,
    pub payload: Value,
}
