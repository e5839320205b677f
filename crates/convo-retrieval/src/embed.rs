//! Embedding generation via fastembed. The model runs a synchronous CPU
//! workload, so every call is pushed onto a blocking thread rather than
//! stalling the async runtime's worker threads.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{RetrievalError, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed(vec![text.to_string()]).await?;
        Ok(out.pop().unwrap_or_default())
    }
}

/// Wraps a `fastembed::TextEmbedding`. The model is loaded once and shared
/// across calls; `std::sync::Mutex` is correct here since the lock is only
/// ever held inside `spawn_blocking`.
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl FastEmbedProvider {
    /// Primary provider: all-MiniLM-L6-v2, fastembed's default model.
    pub fn new() -> Result<Self> {
        Self::with_model(fastembed::EmbeddingModel::AllMiniLML6V2)
    }

    /// Fallback provider: a distinct model so a primary outage (load failure,
    /// OOM, corrupted cache) doesn't take down the same code path twice.
    pub fn new_fallback() -> Result<Self> {
        Self::with_model(fastembed::EmbeddingModel::BGESmallENV15)
    }

    fn with_model(model: fastembed::EmbeddingModel) -> Result<Self> {
        let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(model))
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        Ok(Self { model: Arc::new(Mutex::new(model)) })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        tokio::task::spawn_blocking(move || {
            let model = model.lock().expect("embedding model lock poisoned");
            model.embed(texts, None)
        })
        .await
        .map_err(|e| RetrievalError::Embedding(format!("embedding task panicked: {e}")))?
        .map_err(|e| RetrievalError::Embedding(e.to_string()))
    }
}
