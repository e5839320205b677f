use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use convo_core::types::{BrandId, IngestionJobId, KnowledgeAssetId, TenantId};

use crate::error::{Result, StoreError};
use crate::store::ConvoStore;
use crate::types::{AssetStatus, IngestionJob, IngestionStatus, KnowledgeAsset};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::minutes(5);

impl ConvoStore {
    /// Content-addressed create: re-uploading identical content (same
    /// sha256 within the tenant/brand) returns the existing asset instead
    /// of creating a duplicate.
    pub fn create_or_get_knowledge_asset(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        object_key: &str,
        title: &str,
        visibility: &str,
        sha256: &str,
    ) -> Result<(KnowledgeAsset, bool)> {
        let db = self.db.lock().unwrap();
        let existing = db.query_row(
            "SELECT id, tenant_id, brand_id, object_key, title, visibility, status, sha256, created_at
             FROM knowledge_assets WHERE tenant_id = ?1 AND brand_id = ?2 AND sha256 = ?3",
            rusqlite::params![tenant_id.as_str(), brand_id.as_str(), sha256],
            row_to_asset,
        );
        if let Ok(asset) = existing {
            return Ok((asset, false));
        }

        let asset = KnowledgeAsset {
            id: KnowledgeAssetId::new(),
            tenant_id: tenant_id.clone(),
            brand_id: brand_id.clone(),
            object_key: object_key.to_string(),
            title: title.to_string(),
            visibility: visibility.to_string(),
            status: AssetStatus::Pending,
            sha256: sha256.to_string(),
            created_at: Utc::now(),
        };
        db.execute(
            "INSERT INTO knowledge_assets
             (id, tenant_id, brand_id, object_key, title, visibility, status, sha256, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                asset.id.as_str(),
                asset.tenant_id.as_str(),
                asset.brand_id.as_str(),
                asset.object_key,
                asset.title,
                asset.visibility,
                asset.status.to_string(),
                asset.sha256,
                asset.created_at.to_rfc3339(),
            ],
        )?;
        Ok((asset, true))
    }

    pub fn get_asset(&self, id: &KnowledgeAssetId) -> Result<KnowledgeAsset> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, brand_id, object_key, title, visibility, status, sha256, created_at
             FROM knowledge_assets WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_asset,
        )
        .map_err(|_| StoreError::NotFound(format!("knowledge asset {id}")))
    }

    /// Status transitions forward-only, except the explicit `failed -> pending` retry.
    pub fn update_asset_status(&self, id: &KnowledgeAssetId, status: AssetStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE knowledge_assets SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.to_string(), id.as_str()],
        )?;
        Ok(())
    }

    pub fn create_ingestion_job(&self, asset_id: &KnowledgeAssetId, max_retries: u32) -> Result<IngestionJob> {
        let job = IngestionJob {
            id: IngestionJobId::new(),
            asset_id: asset_id.clone(),
            status: IngestionStatus::Queued,
            attempts: 0,
            max_retries,
            total_chunks: 0,
            processed_chunks: 0,
            failure_reason: None,
            visible_until: Utc::now(),
            logs: Vec::new(),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO ingestion_jobs
             (id, asset_id, status, attempts, max_retries, total_chunks, processed_chunks,
              visible_until, logs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                job.id.as_str(),
                job.asset_id.as_str(),
                job.status.to_string(),
                job.attempts,
                job.max_retries,
                job.total_chunks,
                job.processed_chunks,
                job.visible_until.to_rfc3339(),
                serde_json::to_string(&job.logs)?,
            ],
        )?;
        Ok(job)
    }

    /// Claim the oldest `queued` job (or a `running` job whose visibility
    /// timeout has elapsed, treating it as abandoned) and mark it running
    /// with a fresh visibility deadline.
    pub fn claim_next_ingestion_job(&self) -> Result<Option<IngestionJob>> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let id: Option<String> = db
            .query_row(
                "SELECT id FROM ingestion_jobs
                 WHERE status = 'queued' OR (status = 'running' AND visible_until <= ?1)
                 ORDER BY visible_until ASC LIMIT 1",
                rusqlite::params![now.to_rfc3339()],
                |row| row.get(0),
            )
            .ok();

        let Some(id) = id else { return Ok(None) };
        let visible_until = now + DEFAULT_VISIBILITY_TIMEOUT;
        db.execute(
            "UPDATE ingestion_jobs SET status = 'running', attempts = attempts + 1,
             visible_until = ?1 WHERE id = ?2",
            rusqlite::params![visible_until.to_rfc3339(), id],
        )?;
        drop(db);
        self.get_ingestion_job(&IngestionJobId::from(id)).map(Some)
    }

    /// Extend the visibility timeout — called every `T_vis/3` while a job runs.
    pub fn heartbeat_ingestion_job(&self, id: &IngestionJobId) -> Result<()> {
        let db = self.db.lock().unwrap();
        let visible_until = Utc::now() + DEFAULT_VISIBILITY_TIMEOUT;
        db.execute(
            "UPDATE ingestion_jobs SET visible_until = ?1 WHERE id = ?2",
            rusqlite::params![visible_until.to_rfc3339(), id.as_str()],
        )?;
        Ok(())
    }

    pub fn update_ingestion_progress(
        &self,
        id: &IngestionJobId,
        processed_chunks: u32,
        total_chunks: u32,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE ingestion_jobs SET processed_chunks = ?1, total_chunks = ?2 WHERE id = ?3",
            rusqlite::params![processed_chunks, total_chunks, id.as_str()],
        )?;
        Ok(())
    }

    pub fn complete_ingestion_job(&self, id: &IngestionJobId, total_chunks: u32) -> Result<()> {
        let job = self.get_ingestion_job(id)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE ingestion_jobs SET status = 'succeeded', total_chunks = ?1,
             processed_chunks = ?1 WHERE id = ?2",
            rusqlite::params![total_chunks, id.as_str()],
        )?;
        drop(db);
        self.update_asset_status(&job.asset_id, AssetStatus::Ready)
    }

    /// Transient failure re-queues if under budget; otherwise the job is
    /// terminal and lands in the dead-letter partition.
    pub fn fail_ingestion_job(&self, id: &IngestionJobId, reason: &str, retryable: bool) -> Result<()> {
        let job = self.get_ingestion_job(id)?;
        let db = self.db.lock().unwrap();
        if retryable && job.attempts < job.max_retries {
            db.execute(
                "UPDATE ingestion_jobs SET status = 'queued', failure_reason = ?1 WHERE id = ?2",
                rusqlite::params![reason, id.as_str()],
            )?;
        } else {
            db.execute(
                "UPDATE ingestion_jobs SET status = 'failed', failure_reason = ?1 WHERE id = ?2",
                rusqlite::params![reason, id.as_str()],
            )?;
            drop(db);
            self.update_asset_status(&job.asset_id, AssetStatus::Failed)?;
        }
        Ok(())
    }

    /// Explicit operator retry: reset attempts and re-queue regardless of budget.
    pub fn retry_ingestion_job(&self, id: &IngestionJobId) -> Result<()> {
        let job = self.get_ingestion_job(id)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE ingestion_jobs SET status = 'queued', attempts = 0, failure_reason = NULL
             WHERE id = ?1",
            rusqlite::params![id.as_str()],
        )?;
        drop(db);
        self.update_asset_status(&job.asset_id, AssetStatus::Pending)
    }

    pub fn get_ingestion_job(&self, id: &IngestionJobId) -> Result<IngestionJob> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, asset_id, status, attempts, max_retries, total_chunks, processed_chunks,
                    failure_reason, visible_until, logs
             FROM ingestion_jobs WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_job,
        )
        .map_err(|_| StoreError::NotFound(format!("ingestion job {id}")))
    }

    pub fn list_ingestion_jobs(
        &self,
        tenant_id: &TenantId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<IngestionJob>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT j.id, j.asset_id, j.status, j.attempts, j.max_retries, j.total_chunks,
                    j.processed_chunks, j.failure_reason, j.visible_until, j.logs
             FROM ingestion_jobs j
             JOIN knowledge_assets a ON a.id = j.asset_id
             WHERE a.tenant_id = ?1
             ORDER BY j.visible_until DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![tenant_id.as_str(), limit, offset],
            row_to_job,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeAsset> {
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(8)?;
    Ok(KnowledgeAsset {
        id: row.get::<_, String>(0)?.into(),
        tenant_id: row.get::<_, String>(1)?.into(),
        brand_id: row.get::<_, String>(2)?.into(),
        object_key: row.get(3)?,
        title: row.get(4)?,
        visibility: row.get(5)?,
        status: AssetStatus::from_str(&status_str).unwrap_or(AssetStatus::Pending),
        sha256: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestionJob> {
    let status_str: String = row.get(2)?;
    let visible_str: String = row.get(8)?;
    let logs_str: String = row.get(9)?;
    Ok(IngestionJob {
        id: row.get::<_, String>(0)?.into(),
        asset_id: row.get::<_, String>(1)?.into(),
        status: IngestionStatus::from_str(&status_str).unwrap_or(IngestionStatus::Queued),
        attempts: row.get(3)?,
        max_retries: row.get(4)?,
        total_chunks: row.get(5)?,
        processed_chunks: row.get(6)?,
        failure_reason: row.get(7)?,
        visible_until: DateTime::parse_from_rfc3339(&visible_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        logs: serde_json::from_str(&logs_str).unwrap_or_default(),
    })
}
