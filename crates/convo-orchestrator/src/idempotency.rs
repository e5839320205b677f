//! Inbound event deduplication. `event_id` is the idempotency key supplied
//! by the channel (or synthesized by the gateway); a replayed webhook must
//! short-circuit straight to the first response instead of re-running the
//! pipeline and publishing a second outbound message.
//!
//! The seen-set TTL needs to outlive the inbound webhook's own retry
//! window, or a late gateway retry would slip past it and reprocess.
//! `BackoffPolicy::WEBHOOK_BUFFER` caps at 30s over 6 attempts, so a
//! straight-line worst case is 180s; rounding up with headroom lands on
//! four minutes.

use std::time::Duration;

use convo_core::types::{ConversationId, DeliveryId, EventId};

use crate::cache::TtlCache;

pub const SEEN_EVENT_TTL: Duration = Duration::from_secs(240);

#[derive(Debug, Clone)]
pub struct InboundOutcome {
    pub conversation_id: ConversationId,
    pub delivery_id: DeliveryId,
}

pub struct SeenEvents {
    cache: TtlCache<EventId, InboundOutcome>,
}

impl SeenEvents {
    pub fn new() -> Self {
        Self { cache: TtlCache::new(SEEN_EVENT_TTL) }
    }

    pub fn lookup(&self, event_id: &EventId) -> Option<InboundOutcome> {
        self.cache.get(event_id)
    }

    pub fn record(&self, event_id: EventId, outcome: InboundOutcome) {
        self.cache.insert(event_id, outcome);
    }
}

impl Default for SeenEvents {
    fn default() -> Self {
        Self::new()
    }
}
