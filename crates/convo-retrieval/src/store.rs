//! Vector storage backed by LanceDB. One table per tenant+brand namespace
//! keeps tenant isolation at the storage layer rather than relying on a
//! `WHERE` clause alone.

use std::sync::Arc;

use arrow_array::{
    types::Float32Type, Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use convo_core::types::{BrandId, KnowledgeAssetId, TenantId, VectorRecordId};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;

use crate::error::{RetrievalError, Result};
use crate::types::{RetrievedChunk, VectorChunk};

const EMBEDDING_DIM: i32 = 384; // all-MiniLM-L6-v2

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, chunks: &[VectorChunk]) -> Result<()>;
    async fn query(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;
    async fn delete_asset(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        asset_id: &KnowledgeAssetId,
    ) -> Result<()>;
}

pub struct LanceVectorStore {
    conn: Connection,
}

impl LanceVectorStore {
    pub async fn connect(uri: &str) -> Result<Self> {
        let conn = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        Ok(Self { conn })
    }

    fn table_name(tenant_id: &TenantId, brand_id: &BrandId) -> String {
        format!("chunks_{}_{}", tenant_id.as_str(), brand_id.as_str())
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("asset_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIM,
                ),
                false,
            ),
        ]))
    }

    fn batch_from_chunks(chunks: &[VectorChunk]) -> Result<RecordBatch> {
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let asset_ids: Vec<&str> = chunks.iter().map(|c| c.asset_id.as_str()).collect();
        let chunk_indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        let embedding_values: Vec<Option<f32>> = chunks
            .iter()
            .flat_map(|c| c.embedding.iter().copied().map(Some))
            .collect();
        let embeddings = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            EMBEDDING_DIM,
            Arc::new(Float32Array::from(embedding_values)),
            None,
        );

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(asset_ids)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| RetrievalError::Store(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, chunks: &[VectorChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // All chunks in a batch belong to one upload, hence one tenant/brand.
        let table_name = Self::table_name(&chunks[0].tenant_id, &chunks[0].brand_id);
        let schema = Self::schema();
        let batch = Self::batch_from_chunks(chunks)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());

        let table_names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        if table_names.contains(&table_name) {
            let table = self
                .conn
                .open_table(&table_name)
                .execute()
                .await
                .map_err(|e| RetrievalError::Store(e.to_string()))?;
            table
                .add(Box::new(reader))
                .execute()
                .await
                .map_err(|e| RetrievalError::Store(e.to_string()))?;
        } else {
            self.conn
                .create_table(&table_name, Box::new(reader))
                .execute()
                .await
                .map_err(|e| RetrievalError::Store(e.to_string()))?;
        }

        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let table_name = Self::table_name(tenant_id, brand_id);
        let table_names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        if !table_names.contains(&table_name) {
            return Ok(Vec::new());
        }

        let table = self
            .conn
            .open_table(&table_name)
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        let mut stream = table
            .query()
            .nearest_to(embedding)
            .map_err(|e| RetrievalError::Store(e.to_string()))?
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        let mut out = Vec::with_capacity(limit);
        use futures_util::TryStreamExt;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?
        {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RetrievalError::Store("missing id column".into()))?;
            let asset_ids = batch
                .column_by_name("asset_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RetrievalError::Store("missing asset_id column".into()))?;
            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RetrievalError::Store("missing text column".into()))?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
                out.push(RetrievedChunk {
                    id: VectorRecordId::from(ids.value(i).to_string()),
                    asset_id: KnowledgeAssetId::from(asset_ids.value(i).to_string()),
                    text: texts.value(i).to_string(),
                    // LanceDB returns L2 distance; fold it into a bounded
                    // similarity score so callers can compare against
                    // `min_score` the same way they would a cosine score.
                    dense_score: 1.0 / (1.0 + distance),
                });
            }
        }

        Ok(out)
    }

    async fn delete_asset(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        asset_id: &KnowledgeAssetId,
    ) -> Result<()> {
        let table_name = Self::table_name(tenant_id, brand_id);
        let table_names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        if !table_names.contains(&table_name) {
            return Ok(());
        }

        let table = self
            .conn
            .open_table(&table_name)
            .execute()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        table
            .delete(&format!("asset_id = '{}'", asset_id.as_str()))
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        Ok(())
    }
}

#[allow(unused_imports)]
use lance_index as _; // pulled in for IVF_PQ index creation at larger scale; unused at this table size
