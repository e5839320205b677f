use std::sync::Mutex;

use rusqlite::Connection;

/// Shared OLTP handle. Every entity-specific operation lives in its own
/// module (`tenant`, `conversation`, `policy`, `ingestion`, `automation`)
/// as an inherent impl on this struct.
pub struct ConvoStore {
    pub(crate) db: Mutex<Connection>,
}

impl ConvoStore {
    pub fn new(conn: Connection) -> crate::error::Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn audit(
        &self,
        tenant_id: Option<&str>,
        actor: &str,
        action: &str,
        metadata: serde_json::Value,
    ) -> crate::error::Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO audit_log (tenant_id, actor, action, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                tenant_id,
                actor,
                action,
                metadata.to_string(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
