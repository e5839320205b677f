use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Store(#[from] convo_store::StoreError),

    #[error(transparent)]
    Queue(#[from] convo_queue::QueueError),

    #[error("connector http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connector rejected with status {0}")]
    BadStatus(u16),

    #[error("connector misconfigured: {0}")]
    Config(String),

    #[error("email connector error: {0}")]
    Email(String),

    #[error("connector timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, AutomationError>;
