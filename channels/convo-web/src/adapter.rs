//! Hosted web widget channel adapter.
//!
//! The `web` channel has no platform-hosted push API of its own: delivery
//! means POSTing the reply to the `webhook_url` the widget's owning channel
//! registered in its `credentials` (carried through on the outbound
//! message's metadata by the gateway's outbound worker). Inbound messages
//! still arrive at `/webhooks/web/{channel_id}` like every other channel.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;

use convo_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};

use crate::error::WebError;

pub struct WebAdapter {
    http: reqwest::Client,
    status: RwLock<ChannelStatus>,
}

impl WebAdapter {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new(), status: RwLock::new(ChannelStatus::Disconnected) }
    }
}

impl Default for WebAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for WebAdapter {
    fn name(&self) -> &str {
        "web"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        *self.status.write().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        *self.status.write().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let webhook_url = msg
            .metadata
            .get("webhook_url")
            .and_then(|v| v.as_str())
            .ok_or(WebError::NoWebhookUrl)?;

        let body = json!({
            "delivery_id": msg.delivery_id,
            "recipient_id": msg.external_sender_id,
            "content": msg.content,
        });

        let resp = self.http.post(webhook_url).json(&body).send().await.map_err(WebError::Http)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(WebError::Rejected { status, body }.into())
        }
    }

    fn status(&self) -> ChannelStatus {
        self.status.read().unwrap().clone()
    }
}
