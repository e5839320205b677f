use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use convo_core::types::{BrandId, ChannelId, ConversationId, MessageLogId, TenantId};

use crate::error::{Result, StoreError};
use crate::store::ConvoStore;
use crate::types::{Conversation, Direction, MessageLog};

impl ConvoStore {
    /// Upsert the conversation for `(channel_id, external_sender_id)` and
    /// append the inbound message log in the same transaction. SQLite's
    /// default transaction locking serializes concurrent writers on this
    /// row, standing in for `SELECT ... FOR UPDATE`.
    pub fn upsert_conversation_and_log(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        channel_id: &ChannelId,
        external_sender_id: &str,
        direction: Direction,
        content: &str,
        metadata: HashMap<String, serde_json::Value>,
        correlation_id: Option<&str>,
    ) -> Result<(Conversation, MessageLog)> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let now = Utc::now();

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM conversations WHERE channel_id = ?1 AND external_sender_id = ?2",
                rusqlite::params![channel_id.as_str(), external_sender_id],
                |row| row.get(0),
            )
            .ok();

        let conversation_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
                    rusqlite::params![now.to_rfc3339(), id],
                )?;
                ConversationId::from(id)
            }
            None => {
                let id = ConversationId::new();
                tx.execute(
                    "INSERT INTO conversations
                     (id, tenant_id, brand_id, channel_id, external_sender_id, last_message_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        id.as_str(),
                        tenant_id.as_str(),
                        brand_id.as_str(),
                        channel_id.as_str(),
                        external_sender_id,
                        now.to_rfc3339(),
                    ],
                )?;
                id
            }
        };

        let message = MessageLog {
            id: MessageLogId::new(),
            conversation_id: conversation_id.clone(),
            direction,
            content: content.to_string(),
            metadata,
            correlation_id: correlation_id.map(|s| s.to_string()),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO message_logs
             (id, conversation_id, direction, content, metadata, correlation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id.as_str(),
                message.conversation_id.as_str(),
                message.direction.to_string(),
                message.content,
                serde_json::to_string(&message.metadata)?,
                message.correlation_id,
                message.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        let conversation = Conversation {
            id: conversation_id,
            tenant_id: tenant_id.clone(),
            brand_id: brand_id.clone(),
            channel_id: channel_id.clone(),
            external_sender_id: external_sender_id.to_string(),
            last_message_at: now,
        };
        Ok((conversation, message))
    }

    /// Append the outbound reply, update `last_message_at`, in one
    /// transaction. Optionally writes an audit row when policy mandates it.
    pub fn append_outbound_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        metadata: HashMap<String, serde_json::Value>,
        correlation_id: Option<&str>,
    ) -> Result<MessageLog> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let now = Utc::now();

        tx.execute(
            "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), conversation_id.as_str()],
        )?;

        let message = MessageLog {
            id: MessageLogId::new(),
            conversation_id: conversation_id.clone(),
            direction: Direction::Out,
            content: content.to_string(),
            metadata,
            correlation_id: correlation_id.map(|s| s.to_string()),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO message_logs
             (id, conversation_id, direction, content, metadata, correlation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id.as_str(),
                message.conversation_id.as_str(),
                message.direction.to_string(),
                message.content,
                serde_json::to_string(&message.metadata)?,
                message.correlation_id,
                message.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(message)
    }

    pub fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, brand_id, channel_id, external_sender_id, last_message_at
             FROM conversations WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_conversation,
        )
        .map_err(|_| StoreError::NotFound(format!("conversation {id}")))
    }

    /// Most recent `limit` messages, oldest first — ready to seed the LLM
    /// prompt's "last N turns" window.
    pub fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageLog>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, direction, content, metadata, correlation_id, created_at
             FROM message_logs WHERE conversation_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![conversation_id.as_str(), limit],
            row_to_message,
        )?;
        let mut messages: Vec<MessageLog> = rows.filter_map(|r| r.ok()).collect();
        messages.reverse();
        Ok(messages)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let ts: String = row.get(5)?;
    Ok(Conversation {
        id: row.get::<_, String>(0)?.into(),
        tenant_id: row.get::<_, String>(1)?.into(),
        brand_id: row.get::<_, String>(2)?.into(),
        channel_id: row.get::<_, String>(3)?.into(),
        external_sender_id: row.get(4)?,
        last_message_at: DateTime::parse_from_rfc3339(&ts)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageLog> {
    let dir_str: String = row.get(2)?;
    let meta_str: String = row.get(4)?;
    let ts: String = row.get(6)?;
    Ok(MessageLog {
        id: row.get::<_, String>(0)?.into(),
        conversation_id: row.get::<_, String>(1)?.into(),
        direction: Direction::from_str(&dir_str).unwrap_or(Direction::In),
        content: row.get(3)?,
        metadata: serde_json::from_str(&meta_str).unwrap_or_default(),
        correlation_id: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&ts)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
