use convo_core::types::{BrandId, KnowledgeAssetId, TenantId, VectorRecordId};
use serde::{Deserialize, Serialize};

/// One chunk of a knowledge asset, embedded and ready to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorChunk {
    pub id: VectorRecordId,
    pub tenant_id: TenantId,
    pub brand_id: BrandId,
    pub asset_id: KnowledgeAssetId,
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by a retrieval query, carrying both the dense similarity
/// score and enough text to let the caller do a lexical pass over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: VectorRecordId,
    pub asset_id: KnowledgeAssetId,
    pub text: String,
    pub dense_score: f32,
}

/// A chunk after hybrid scoring and budget truncation, ready to splice into
/// an LLM prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedChunk {
    pub id: VectorRecordId,
    pub asset_id: KnowledgeAssetId,
    pub text: String,
    pub score: f32,
    pub approx_tokens: u32,
}
