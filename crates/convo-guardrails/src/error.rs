use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("guardrail rule execution failed: {0}")]
    ExecutionFailed(String),

    #[error("guardrail rule timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("guardrail configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, GuardrailError>;
