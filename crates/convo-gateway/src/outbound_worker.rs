//! Outbound delivery worker — consumes the outbound queue and dispatches to
//! the provider adapter registered under `channel_id`'s channel type.

use std::sync::Arc;
use std::time::Duration;

use convo_channels::OutboundMessage as ChannelOutboundMessage;
use tracing::{info, warn};

use crate::app::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLAIM_BATCH: u32 = 16;

/// Runs forever, polling the outbound queue and delivering ready records.
pub async fn run(state: Arc<AppState>) {
    loop {
        let ready = match state.outbound.claim_ready(CLAIM_BATCH) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "failed to claim outbound records");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        if ready.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        for record in ready {
            let channel_row = match state.get_channel_cached(&record.channel_id).await {
                Ok(c) => c,
                Err(_) => {
                    warn!(channel_id = %record.channel_id, "outbound record references unknown channel, dropping");
                    let _ = state.outbound.ack(&record.delivery_id);
                    continue;
                }
            };

            let adapter = state.channels.get(channel_row.channel_type.as_str());
            let Some(adapter) = adapter else {
                warn!(channel_type = %channel_row.channel_type, "no adapter registered for channel type");
                let _ = state.outbound.nack(&record.delivery_id, state.config.limits.outbound_max_attempts);
                continue;
            };

            // Channel-specific credentials (e.g. the `web` channel's delivery
            // `webhook_url`) ride along as metadata so the adapter can reach
            // them without the gateway knowing per-channel-type shapes.
            let mut metadata = channel_row.credentials.clone();
            metadata.extend(record.metadata.clone());

            let outbound_msg = ChannelOutboundMessage {
                delivery_id: record.delivery_id.as_str().to_string(),
                channel_id: record.channel_id.clone(),
                external_sender_id: record.external_sender_id.clone(),
                content: record.content.clone(),
                metadata,
                attempt: record.attempt,
                format: Default::default(),
                correlation_id: record.correlation_id.clone(),
            };

            match adapter.send(&outbound_msg).await {
                Ok(()) => {
                    info!(delivery_id = %record.delivery_id, "outbound delivered");
                    if let Err(e) = state.outbound.ack(&record.delivery_id) {
                        warn!(error = %e, "failed to ack delivered outbound record");
                    }
                }
                Err(e) => {
                    warn!(delivery_id = %record.delivery_id, error = %e, "outbound delivery failed");
                    match state
                        .outbound
                        .nack(&record.delivery_id, state.config.limits.outbound_max_attempts)
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            let _ = state.store.audit(
                                Some(channel_row.tenant_id.as_str()),
                                "gateway",
                                "outbound.failed",
                                serde_json::json!({"delivery_id": record.delivery_id.as_str()}),
                            );
                        }
                        Err(e) => warn!(error = %e, "failed to nack outbound record"),
                    }
                }
            }
        }
    }
}
