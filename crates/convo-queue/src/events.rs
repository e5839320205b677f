use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;
use crate::types::DomainEvent;

/// Durable log of domain events for automation's event-trigger rules.
/// Event-trigger rules poll this log rather than subscribing to an
/// in-process channel, so a rule created after an event fired can still
/// backfill from `since_id` and workers can restart without losing events.
pub struct EventLog {
    db: Mutex<Connection>,
}

impl EventLog {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS domain_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                tenant_id   TEXT NOT NULL,
                payload     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_domain_events_name
                ON domain_events(tenant_id, name, id);",
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn publish(&self, event: &DomainEvent) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO domain_events (name, tenant_id, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                event.name,
                event.tenant_id,
                serde_json::to_string(&event.payload)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Events for `tenant_id` named `name` with id strictly greater than
    /// `since_id`, oldest first. Callers persist the highest id they
    /// consumed and pass it back next poll.
    pub fn since(&self, tenant_id: &str, name: &str, since_id: i64) -> Result<Vec<(i64, DomainEvent)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, tenant_id, payload FROM domain_events
             WHERE tenant_id = ?1 AND name = ?2 AND id > ?3
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![tenant_id, name, since_id], |row| {
                let payload_str: String = row.get(3)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    DomainEvent {
                        name: row.get(1)?,
                        tenant_id: row.get(2)?,
                        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
                    },
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_returns_only_newer_events_for_the_matching_name() {
        let log = EventLog::new(Connection::open_in_memory().unwrap()).unwrap();
        let id1 = log
            .publish(&DomainEvent {
                name: "order.created".into(),
                tenant_id: "t1".into(),
                payload: serde_json::json!({"order": 1}),
            })
            .unwrap();
        log.publish(&DomainEvent {
            name: "order.cancelled".into(),
            tenant_id: "t1".into(),
            payload: serde_json::json!({}),
        })
        .unwrap();
        log.publish(&DomainEvent {
            name: "order.created".into(),
            tenant_id: "t1".into(),
            payload: serde_json::json!({"order": 2}),
        })
        .unwrap();

        let events = log.since("t1", "order.created", id1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.payload["order"], 2);
    }
}
