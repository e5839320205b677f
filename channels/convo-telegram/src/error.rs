use convo_channels::ChannelError;

/// Errors produced by the Telegram adapter.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("no bot token configured")]
    NoToken,
}

impl From<TelegramError> for ChannelError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::NoToken => ChannelError::ConfigError(e.to_string()),
            TelegramError::Teloxide(_) => ChannelError::SendFailed(e.to_string()),
        }
    }
}
