use thiserror::Error;

use convo_channels::ChannelError;

#[derive(Debug, Error)]
pub enum InstagramError {
    #[error("no page access token configured")]
    NoToken,

    #[error("no ig account id configured")]
    NoAccountId,

    #[error("graph api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("graph api rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<InstagramError> for ChannelError {
    fn from(err: InstagramError) -> Self {
        match err {
            InstagramError::NoToken => ChannelError::AuthFailed("missing page access token".into()),
            InstagramError::NoAccountId => ChannelError::ConfigError("missing ig account id".into()),
            InstagramError::Http(e) => ChannelError::SendFailed(e.to_string()),
            InstagramError::Rejected { status, body } => {
                ChannelError::SendFailed(format!("status {status}: {body}"))
            }
        }
    }
}
