use thiserror::Error;

use convo_channels::ChannelError;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("outbound message carries no webhook_url in its channel credentials")]
    NoWebhookUrl,

    #[error("widget callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("widget callback rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<WebError> for ChannelError {
    fn from(err: WebError) -> Self {
        match err {
            WebError::NoWebhookUrl => ChannelError::ConfigError("missing webhook_url".into()),
            WebError::Http(e) => ChannelError::SendFailed(e.to_string()),
            WebError::Rejected { status, body } => {
                ChannelError::SendFailed(format!("status {status}: {body}"))
            }
        }
    }
}
