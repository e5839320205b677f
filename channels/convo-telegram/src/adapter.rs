//! Telegram channel adapter.
//!
//! Inbound messages arrive at the Gateway's `/webhooks/telegram/{channel_id}`
//! HTTP endpoint, not through this adapter — Telegram's webhook ingress is
//! normalized there. This adapter is purely the outbound half: given an
//! `OutboundMessage`, deliver it to the right chat.

use std::sync::RwLock;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::requests::Requester;

use convo_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};

use crate::error::TelegramError;

pub struct TelegramAdapter {
    bot_token: String,
    bot: Bot,
    status: RwLock<ChannelStatus>,
}

impl TelegramAdapter {
    pub fn new(bot_token: impl Into<String>) -> Self {
        let bot_token = bot_token.into();
        let bot = Bot::new(&bot_token);
        Self { bot_token, bot, status: RwLock::new(ChannelStatus::Disconnected) }
    }
}

#[async_trait]
impl Channel for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.bot_token.is_empty() {
            return Err(TelegramError::NoToken.into());
        }
        *self.status.write().unwrap() = ChannelStatus::Connecting;
        match self.bot.get_me().await {
            Ok(_) => {
                *self.status.write().unwrap() = ChannelStatus::Connected;
                Ok(())
            }
            Err(e) => {
                let err: ChannelError = TelegramError::Teloxide(e).into();
                *self.status.write().unwrap() = ChannelStatus::Error(err.to_string());
                Err(err)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        *self.status.write().unwrap() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let chat_id: i64 = msg.external_sender_id.parse().map_err(|_| {
            ChannelError::SendFailed(format!(
                "invalid telegram chat id: {}",
                msg.external_sender_id
            ))
        })?;
        crate::send::send_response(&self.bot, ChatId(chat_id), &msg.content)
            .await
            .map_err(|e| TelegramError::Teloxide(e).into())
    }

    fn status(&self) -> ChannelStatus {
        self.status.read().unwrap().clone()
    }
}
