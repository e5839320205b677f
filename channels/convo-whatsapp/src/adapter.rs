//! WhatsApp Cloud API channel adapter.
//!
//! Inbound messages arrive at the Gateway's `/webhooks/whatsapp/{channel_id}`
//! HTTP endpoint, not through this adapter — this is the outbound half only,
//! posting to the Graph API's `/messages` endpoint the way Meta's Cloud API
//! expects.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;

use convo_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};

use crate::error::WhatsAppError;

const GRAPH_API_VERSION: &str = "v19.0";

pub struct WhatsAppAdapter {
    access_token: String,
    phone_number_id: String,
    http: reqwest::Client,
    status: RwLock<ChannelStatus>,
}

impl WhatsAppAdapter {
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            http: reqwest::Client::new(),
            status: RwLock::new(ChannelStatus::Disconnected),
        }
    }
}

#[async_trait]
impl Channel for WhatsAppAdapter {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.access_token.is_empty() {
            return Err(WhatsAppError::NoToken.into());
        }
        if self.phone_number_id.is_empty() {
            return Err(WhatsAppError::NoPhoneNumberId.into());
        }
        *self.status.write().unwrap() = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        *self.status.write().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let url = format!(
            "https://graph.facebook.com/{GRAPH_API_VERSION}/{}/messages",
            self.phone_number_id
        );
        let body = json!({
            "messaging_product": "whatsapp",
            "to": msg.external_sender_id,
            "type": "text",
            "text": { "body": msg.content },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(WhatsAppError::Http)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(WhatsAppError::Rejected { status, body }.into())
        }
    }

    fn status(&self) -> ChannelStatus {
        self.status.read().unwrap().clone()
    }
}
