//! Instagram Direct channel adapter, via the Meta Graph API's Messenger
//! Platform surface for Instagram professional accounts.
//!
//! Inbound messages arrive at the Gateway's `/webhooks/instagram/{channel_id}`
//! HTTP endpoint; this adapter is the outbound half only.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;

use convo_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};

use crate::error::InstagramError;

const GRAPH_API_VERSION: &str = "v19.0";

pub struct InstagramAdapter {
    page_access_token: String,
    ig_account_id: String,
    http: reqwest::Client,
    status: RwLock<ChannelStatus>,
}

impl InstagramAdapter {
    pub fn new(page_access_token: impl Into<String>, ig_account_id: impl Into<String>) -> Self {
        Self {
            page_access_token: page_access_token.into(),
            ig_account_id: ig_account_id.into(),
            http: reqwest::Client::new(),
            status: RwLock::new(ChannelStatus::Disconnected),
        }
    }
}

#[async_trait]
impl Channel for InstagramAdapter {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.page_access_token.is_empty() {
            return Err(InstagramError::NoToken.into());
        }
        if self.ig_account_id.is_empty() {
            return Err(InstagramError::NoAccountId.into());
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
            self.ig_account_id
        );
        let body = json!({
            "recipient": { "id": msg.external_sender_id },
            "message": { "text": msg.content },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.page_access_token)
            .json(&body)
            .send()
            .await
            .map_err(InstagramError::Http)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(InstagramError::Rejected { status, body }.into())
        }
    }

    fn status(&self) -> ChannelStatus {
        self.status.read().unwrap().clone()
    }
}
