use thiserror::Error;

use convo_channels::ChannelError;

#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("no access token configured")]
    NoToken,

    #[error("no phone number id configured")]
    NoPhoneNumberId,

    #[error("cloud api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cloud api rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<WhatsAppError> for ChannelError {
    fn from(err: WhatsAppError) -> Self {
        match err {
            WhatsAppError::NoToken => ChannelError::AuthFailed("missing access token".into()),
            WhatsAppError::NoPhoneNumberId => ChannelError::ConfigError("missing phone number id".into()),
            WhatsAppError::Http(e) => ChannelError::SendFailed(e.to_string()),
            WhatsAppError::Rejected { status, body } => {
                ChannelError::SendFailed(format!("status {status}: {body}"))
            }
        }
    }
}
