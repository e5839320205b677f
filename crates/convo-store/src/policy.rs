use std::str::FromStr;

use chrono::{DateTime, Utc};
use convo_core::types::{PolicyVersionId, TenantId};

use crate::error::{Result, StoreError};
use crate::store::ConvoStore;
use crate::types::{PolicyStatus, PolicyVersion, RetrievalConfig};

impl ConvoStore {
    pub fn create_draft_policy(
        &self,
        tenant_id: &TenantId,
        policy_json: serde_json::Value,
    ) -> Result<PolicyVersion> {
        let db = self.db.lock().unwrap();
        let next_version: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM policy_versions WHERE tenant_id = ?1",
                rusqlite::params![tenant_id.as_str()],
                |row| row.get(0),
            )
            .unwrap_or(1);

        let version = PolicyVersion {
            id: PolicyVersionId::new(),
            tenant_id: tenant_id.clone(),
            version: next_version,
            status: PolicyStatus::Draft,
            policy_json,
            published_at: None,
        };
        db.execute(
            "INSERT INTO policy_versions (id, tenant_id, version, status, policy_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                version.id.as_str(),
                version.tenant_id.as_str(),
                version.version,
                version.status.to_string(),
                version.policy_json.to_string(),
            ],
        )?;
        Ok(version)
    }

    /// Publish a draft: archive the currently-published version (at most
    /// one `published` per tenant) and mark this one published, inside one
    /// transaction.
    pub fn publish_policy(&self, id: &PolicyVersionId) -> Result<PolicyVersion> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let now = Utc::now();

        let tenant_id: String = tx.query_row(
            "SELECT tenant_id FROM policy_versions WHERE id = ?1",
            rusqlite::params![id.as_str()],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE policy_versions SET status = 'archived'
             WHERE tenant_id = ?1 AND status = 'published'",
            rusqlite::params![tenant_id],
        )?;
        tx.execute(
            "UPDATE policy_versions SET status = 'published', published_at = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id.as_str()],
        )?;
        tx.commit()?;
        drop(db);
        self.get_policy(id)
    }

    pub fn get_policy(&self, id: &PolicyVersionId) -> Result<PolicyVersion> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, version, status, policy_json, published_at
             FROM policy_versions WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_policy,
        )
        .map_err(|_| StoreError::NotFound(format!("policy version {id}")))
    }

    /// Look up a tenant's policy by its sequential version number, for the
    /// admin diff endpoint.
    pub fn get_policy_by_version(&self, tenant_id: &TenantId, version: i64) -> Result<PolicyVersion> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, version, status, policy_json, published_at
             FROM policy_versions WHERE tenant_id = ?1 AND version = ?2",
            rusqlite::params![tenant_id.as_str(), version],
            row_to_policy,
        )
        .map_err(|_| StoreError::NotFound(format!("policy version {version} for tenant {tenant_id}")))
    }

    /// The single `published` policy for a tenant, or `None` if no policy
    /// has ever been published — callers fall back to the built-in default
    /// policy in that case.
    pub fn get_published_policy(&self, tenant_id: &TenantId) -> Result<Option<PolicyVersion>> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT id, tenant_id, version, status, policy_json, published_at
             FROM policy_versions WHERE tenant_id = ?1 AND status = 'published'",
            rusqlite::params![tenant_id.as_str()],
            row_to_policy,
        );
        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn upsert_retrieval_config(&self, config: &RetrievalConfig) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO retrieval_configs
             (tenant_id, hybrid_weight, min_score, max_documents, context_budget_tokens,
              filters, fallback_llm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id) DO UPDATE SET
               hybrid_weight = excluded.hybrid_weight,
               min_score = excluded.min_score,
               max_documents = excluded.max_documents,
               context_budget_tokens = excluded.context_budget_tokens,
               filters = excluded.filters,
               fallback_llm = excluded.fallback_llm",
            rusqlite::params![
                config.tenant_id.as_str(),
                config.hybrid_weight,
                config.min_score,
                config.max_documents,
                config.context_budget_tokens,
                config.filters.to_string(),
                config.fallback_llm,
            ],
        )?;
        Ok(())
    }

    pub fn get_retrieval_config(&self, tenant_id: &TenantId) -> Result<RetrievalConfig> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT tenant_id, hybrid_weight, min_score, max_documents, context_budget_tokens,
                    filters, fallback_llm
             FROM retrieval_configs WHERE tenant_id = ?1",
            rusqlite::params![tenant_id.as_str()],
            |row| {
                let filters_str: String = row.get(5)?;
                Ok(RetrievalConfig {
                    tenant_id: row.get::<_, String>(0)?.into(),
                    hybrid_weight: row.get(1)?,
                    min_score: row.get(2)?,
                    max_documents: row.get(3)?,
                    context_budget_tokens: row.get(4)?,
                    filters: serde_json::from_str(&filters_str).unwrap_or(serde_json::Value::Null),
                    fallback_llm: row.get(6)?,
                })
            },
        );
        match result {
            Ok(c) => Ok(c),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(RetrievalConfig {
                tenant_id: tenant_id.clone(),
                ..Default::default()
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_policy(row: &rusqlite::Row<'_>) -> rusqlite::Result<PolicyVersion> {
    let status_str: String = row.get(3)?;
    let policy_str: String = row.get(4)?;
    let published_str: Option<String> = row.get(5)?;
    Ok(PolicyVersion {
        id: row.get::<_, String>(0)?.into(),
        tenant_id: row.get::<_, String>(1)?.into(),
        version: row.get(2)?,
        status: PolicyStatus::from_str(&status_str).unwrap_or(PolicyStatus::Draft),
        policy_json: serde_json::from_str(&policy_str).unwrap_or(serde_json::Value::Null),
        published_at: published_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}
