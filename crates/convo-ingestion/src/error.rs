use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Store(#[from] convo_store::StoreError),

    #[error(transparent)]
    Retrieval(#[from] convo_retrieval::RetrievalError),

    #[error(transparent)]
    ObjectStore(#[from] convo_core::ObjectStoreError),

    #[error(transparent)]
    Chunk(#[from] crate::chunk::ChunkError),

    #[error(transparent)]
    Queue(#[from] convo_queue::QueueError),
}

impl IngestionError {
    /// Transient errors (object store / network / vector store hiccups)
    /// re-queue under the job's retry budget; permanent ones (unparsable
    /// content, missing object) fail the job outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestionError::Store(_) => true,
            IngestionError::Retrieval(_) => true,
            IngestionError::ObjectStore(convo_core::ObjectStoreError::NotFound(_)) => false,
            IngestionError::ObjectStore(_) => true,
            IngestionError::Chunk(_) => false,
            IngestionError::Queue(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
