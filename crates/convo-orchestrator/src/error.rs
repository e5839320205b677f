use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use convo_core::ErrorClass;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] convo_store::StoreError),

    #[error(transparent)]
    Queue(#[from] convo_queue::QueueError),

    #[error(transparent)]
    Retrieval(#[from] convo_retrieval::RetrievalError),

    #[error(transparent)]
    Provider(#[from] convo_llm::ProviderError),

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl PipelineError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            PipelineError::Validation(_) => ErrorClass::Validation,
            PipelineError::NotFound(_) => ErrorClass::NotFound,
            PipelineError::Store(e) => match e {
                convo_store::StoreError::NotFound(_) => ErrorClass::NotFound,
                convo_store::StoreError::Conflict(_) => ErrorClass::Conflict,
                _ => ErrorClass::Transient,
            },
            PipelineError::Queue(_) => ErrorClass::Transient,
            PipelineError::Retrieval(_) => ErrorClass::Degraded,
            PipelineError::Provider(e) if e.is_retryable() => ErrorClass::Transient,
            PipelineError::Provider(_) => ErrorClass::Permanent,
            PipelineError::DeadlineExceeded => ErrorClass::Transient,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let class = self.classify();
        let status = StatusCode::from_u16(class.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({"error": self.to_string()}));
        (status, body).into_response()
    }
}
