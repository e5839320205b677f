use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use convo_core::backoff::BackoffPolicy;
use convo_core::types::{ChannelId, CorrelationId, DeliveryId};
use rusqlite::Connection;

use crate::error::Result;
use crate::types::OutboundRecord;

/// Same retry schedule as the webhook inbound buffer: base 500ms, factor 2,
/// jitter ±25%, cap 30s.
pub const DELIVERY_BACKOFF: BackoffPolicy = BackoffPolicy {
    base_ms: 500,
    factor: 2.0,
    jitter_fraction: 0.25,
    cap_ms: 30_000,
    max_attempts: 5,
};

/// Durable, partitioned outbound queue backed by SQLite. Ordering per
/// `(channel_id, external_sender_id)` is enforced by never claiming a
/// record while an earlier record for the same partition is still
/// in-flight.
pub struct OutboundQueue {
    db: Mutex<Connection>,
}

impl OutboundQueue {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS outbound_records (
                rowid               INTEGER PRIMARY KEY AUTOINCREMENT,
                delivery_id         TEXT NOT NULL UNIQUE,
                channel_id          TEXT NOT NULL,
                external_sender_id  TEXT NOT NULL,
                content             TEXT NOT NULL,
                metadata            TEXT NOT NULL DEFAULT '{}',
                attempt             INTEGER NOT NULL DEFAULT 0,
                correlation_id      TEXT,
                status              TEXT NOT NULL DEFAULT 'pending',
                available_at        TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outbound_partition
                ON outbound_records(channel_id, external_sender_id, status);",
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Publish is idempotent on `delivery_id` — duplicate publishes from a
    /// retried commit are tolerated.
    pub fn publish(&self, record: &OutboundRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO outbound_records
             (delivery_id, channel_id, external_sender_id, content, metadata, attempt,
              correlation_id, status, available_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)
             ON CONFLICT(delivery_id) DO NOTHING",
            rusqlite::params![
                record.delivery_id.as_str(),
                record.channel_id.as_str(),
                record.external_sender_id,
                record.content,
                serde_json::to_string(&record.metadata)?,
                record.attempt,
                record.correlation_id.as_ref().map(|c| c.as_str()),
                now,
            ],
        )?;
        Ok(())
    }

    /// Claim up to `limit` deliverable records: pending, due (`available_at`
    /// elapsed), and the earliest for their partition with nothing else
    /// in-flight.
    pub fn claim_ready(&self, limit: u32) -> Result<Vec<OutboundRecord>> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let mut stmt = db.prepare(
            "SELECT rowid, delivery_id, channel_id, external_sender_id, content, metadata,
                    attempt, correlation_id
             FROM outbound_records r
             WHERE status = 'pending' AND available_at <= ?1
             AND NOT EXISTS (
                 SELECT 1 FROM outbound_records r2
                 WHERE r2.channel_id = r.channel_id
                   AND r2.external_sender_id = r.external_sender_id
                   AND r2.status = 'inflight'
             )
             AND rowid = (
                 SELECT MIN(r3.rowid) FROM outbound_records r3
                 WHERE r3.channel_id = r.channel_id
                   AND r3.external_sender_id = r.external_sender_id
                   AND r3.status = 'pending'
             )
             ORDER BY rowid ASC
             LIMIT ?2",
        )?;
        let rows: Vec<(i64, OutboundRecord)> = stmt
            .query_map(rusqlite::params![now, limit], |row| {
                let meta_str: String = row.get(5)?;
                let corr: Option<String> = row.get(7)?;
                Ok((
                    row.get(0)?,
                    OutboundRecord {
                        delivery_id: row.get::<_, String>(1)?.into(),
                        channel_id: ChannelId::from(row.get::<_, String>(2)?),
                        external_sender_id: row.get(3)?,
                        content: row.get(4)?,
                        metadata: serde_json::from_str(&meta_str).unwrap_or_default(),
                        attempt: row.get(6)?,
                        correlation_id: corr.map(CorrelationId::from),
                    },
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for (rowid, _) in &rows {
            db.execute(
                "UPDATE outbound_records SET status = 'inflight' WHERE rowid = ?1",
                rusqlite::params![rowid],
            )?;
        }
        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }

    pub fn ack(&self, delivery_id: &DeliveryId) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM outbound_records WHERE delivery_id = ?1",
            rusqlite::params![delivery_id.as_str()],
        )?;
        Ok(())
    }

    /// On failure: bump `attempt` and either re-queue with backoff, or move
    /// to the dead-letter partition once `OUTBOUND_MAX_ATTEMPTS` is spent.
    pub fn nack(&self, delivery_id: &DeliveryId, max_attempts: u32) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let attempt: u32 = db.query_row(
            "SELECT attempt FROM outbound_records WHERE delivery_id = ?1",
            rusqlite::params![delivery_id.as_str()],
            |row| row.get(0),
        )?;
        let next_attempt = attempt + 1;

        if next_attempt >= max_attempts {
            db.execute(
                "UPDATE outbound_records SET status = 'dead_letter', attempt = ?1 WHERE delivery_id = ?2",
                rusqlite::params![next_attempt, delivery_id.as_str()],
            )?;
            Ok(false)
        } else {
            let delay = DELIVERY_BACKOFF.delay_for(next_attempt);
            let available_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            db.execute(
                "UPDATE outbound_records SET status = 'pending', attempt = ?1, available_at = ?2
                 WHERE delivery_id = ?3",
                rusqlite::params![next_attempt, available_at.to_rfc3339(), delivery_id.as_str()],
            )?;
            Ok(true)
        }
    }

    pub fn dead_letter_count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM outbound_records WHERE status = 'dead_letter'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(delivery_id: &str, channel: &str, sender: &str) -> OutboundRecord {
        OutboundRecord {
            delivery_id: DeliveryId::from(delivery_id.to_string()),
            channel_id: ChannelId::from(channel.to_string()),
            external_sender_id: sender.to_string(),
            content: "hello".to_string(),
            metadata: HashMap::new(),
            attempt: 0,
            correlation_id: None,
        }
    }

    #[test]
    fn duplicate_publish_is_deduped_by_delivery_id() {
        let q = OutboundQueue::new(Connection::open_in_memory().unwrap()).unwrap();
        let rec = sample("d1", "c1", "u1");
        q.publish(&rec).unwrap();
        q.publish(&rec).unwrap();

        let ready = q.claim_ready(10).unwrap();
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn ordering_within_partition_is_preserved() {
        let q = OutboundQueue::new(Connection::open_in_memory().unwrap()).unwrap();
        q.publish(&sample("d1", "c1", "u1")).unwrap();
        q.publish(&sample("d2", "c1", "u1")).unwrap();

        let first = q.claim_ready(10).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].delivery_id.as_str(), "d1");

        // second record blocked while d1 is in-flight
        let still_blocked = q.claim_ready(10).unwrap();
        assert!(still_blocked.is_empty());

        q.ack(&first[0].delivery_id).unwrap();
        let second = q.claim_ready(10).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_id.as_str(), "d2");
    }

    #[test]
    fn exhausted_retries_move_to_dead_letter() {
        let q = OutboundQueue::new(Connection::open_in_memory().unwrap()).unwrap();
        q.publish(&sample("d1", "c1", "u1")).unwrap();
        q.claim_ready(10).unwrap();

        assert!(!q.nack(&DeliveryId::from("d1".to_string()), 1).unwrap());
        assert_eq!(q.dead_letter_count().unwrap(), 1);
    }
}
