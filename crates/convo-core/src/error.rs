use thiserror::Error;

/// The seven error kinds from the error handling design, plus their HTTP/retry policy.
///
/// `classify()` maps any `ConvoError` onto one of these so every HTTP handler and
/// every retry loop in the workspace makes the same decision from the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad signature, bad JWT. 401/403, never retried, audited.
    Auth,
    /// Unparsable payload, missing tenant. 400, not retried.
    Validation,
    /// Unknown tenant/channel/rule. 404, not retried.
    NotFound,
    /// Idempotency collision with a different payload. 409, surfaced to caller.
    Conflict,
    /// Timeouts, 5xx, connection reset. Retried in-process, 503 once exhausted.
    Transient,
    /// Quota exhausted, unsupported format. Terminal, written to failure_reason, audited.
    Permanent,
    /// Embedding failed, retrieval empty. Logged, flagged, pipeline continues degraded.
    Degraded,
}

impl ErrorClass {
    /// Only Transient crosses a component boundary as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorClass::Auth => 401,
            ErrorClass::Validation => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 409,
            ErrorClass::Transient => 503,
            ErrorClass::Permanent => 422,
            ErrorClass::Degraded => 200,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvoError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvoError {
    pub fn code(&self) -> &'static str {
        match self {
            ConvoError::Config(_) => "CONFIG_ERROR",
            ConvoError::SignatureMismatch => "AUTH_SIGNATURE_MISMATCH",
            ConvoError::AuthFailed(_) => "AUTH_FAILED",
            ConvoError::Validation(_) => "VALIDATION_ERROR",
            ConvoError::NotFound(_) => "NOT_FOUND",
            ConvoError::Conflict(_) => "CONFLICT",
            ConvoError::Database(_) => "DATABASE_ERROR",
            ConvoError::Transient(_) => "TRANSIENT_ERROR",
            ConvoError::Permanent(_) => "PERMANENT_ERROR",
            ConvoError::Degraded(_) => "DEGRADED",
            ConvoError::Timeout { .. } => "TIMEOUT",
            ConvoError::Serialization(_) => "SERIALIZATION_ERROR",
            ConvoError::Io(_) => "IO_ERROR",
            ConvoError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn classify(&self) -> ErrorClass {
        match self {
            ConvoError::SignatureMismatch | ConvoError::AuthFailed(_) => ErrorClass::Auth,
            ConvoError::Validation(_) | ConvoError::Serialization(_) => ErrorClass::Validation,
            ConvoError::NotFound(_) => ErrorClass::NotFound,
            ConvoError::Conflict(_) => ErrorClass::Conflict,
            ConvoError::Transient(_) | ConvoError::Timeout { .. } | ConvoError::Io(_) => {
                ErrorClass::Transient
            }
            ConvoError::Permanent(_) => ErrorClass::Permanent,
            ConvoError::Degraded(_) => ErrorClass::Degraded,
            // A raw rusqlite error could be transient (locked) or programmer error;
            // treat as transient since callers already wrap pool exhaustion this way.
            ConvoError::Database(_) => ErrorClass::Transient,
            ConvoError::Config(_) | ConvoError::Internal(_) => ErrorClass::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvoError>;
