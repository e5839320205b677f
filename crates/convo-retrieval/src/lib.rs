pub mod embed;
pub mod error;
pub mod select;
pub mod store;
pub mod types;

pub use embed::{EmbeddingProvider, FastEmbedProvider};
pub use error::{RetrievalError, Result};
pub use select::select;
pub use store::{LanceVectorStore, VectorStore};
pub use types::{RetrievedChunk, SelectedChunk, VectorChunk};
