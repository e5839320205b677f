use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use convo_core::types::{BrandId, ChannelId, ChannelType, TenantId};

use crate::error::{Result, StoreError};
use crate::store::ConvoStore;
use crate::types::{Brand, Channel, Tenant};

/// Secrets rotated today stay valid for this long so in-flight signed
/// webhooks using the old secret still verify: add new, wait for grace,
/// remove old.
const SECRET_GRACE: Duration = Duration::hours(24);

impl ConvoStore {
    pub fn create_tenant(
        &self,
        name: &str,
        timezone: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Tenant> {
        let tenant = Tenant {
            id: TenantId::new(),
            name: name.to_string(),
            timezone: timezone.to_string(),
            metadata,
            deleted_at: None,
            created_at: Utc::now(),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tenants (id, name, timezone, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                tenant.id.as_str(),
                tenant.name,
                tenant.timezone,
                serde_json::to_string(&tenant.metadata)?,
                tenant.created_at.to_rfc3339(),
            ],
        )?;
        Ok(tenant)
    }

    pub fn get_tenant(&self, id: &TenantId) -> Result<Tenant> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, name, timezone, metadata, deleted_at, created_at
             FROM tenants WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_tenant,
        )
        .map_err(|_| StoreError::NotFound(format!("tenant {id}")))
    }

    pub fn create_brand(&self, tenant_id: &TenantId, name: &str) -> Result<Brand> {
        let brand = Brand {
            id: BrandId::new(),
            tenant_id: tenant_id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO brands (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                brand.id.as_str(),
                brand.tenant_id.as_str(),
                brand.name,
                brand.created_at.to_rfc3339(),
            ],
        )?;
        Ok(brand)
    }

    pub fn create_channel(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        channel_type: ChannelType,
        display_name: &str,
        hmac_secret: &str,
        credentials: HashMap<String, serde_json::Value>,
    ) -> Result<Channel> {
        let channel = Channel {
            id: ChannelId::new(),
            tenant_id: tenant_id.clone(),
            brand_id: brand_id.clone(),
            channel_type,
            display_name: display_name.to_string(),
            hmac_secret: hmac_secret.to_string(),
            previous_hmac_secret: None,
            secret_grace_until: None,
            credentials,
            active: true,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO channels
             (id, tenant_id, brand_id, channel_type, display_name, hmac_secret,
              credentials, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                channel.id.as_str(),
                channel.tenant_id.as_str(),
                channel.brand_id.as_str(),
                channel.channel_type.as_str(),
                channel.display_name,
                channel.hmac_secret,
                serde_json::to_string(&channel.credentials)?,
                channel.active as i64,
            ],
        )?;
        Ok(channel)
    }

    pub fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, brand_id, channel_type, display_name, hmac_secret,
                    previous_hmac_secret, secret_grace_until, credentials, active
             FROM channels WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_channel,
        )
        .map_err(|_| StoreError::NotFound(format!("channel {id}")))
    }

    /// Rotate the channel's HMAC secret. The previous secret stays valid
    /// until the grace window elapses.
    pub fn rotate_channel_secret(&self, id: &ChannelId, new_secret: &str) -> Result<Channel> {
        let channel = self.get_channel(id)?;
        let grace_until = Utc::now() + SECRET_GRACE;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channels SET hmac_secret = ?1, previous_hmac_secret = ?2,
             secret_grace_until = ?3 WHERE id = ?4",
            rusqlite::params![
                new_secret,
                channel.hmac_secret,
                grace_until.to_rfc3339(),
                id.as_str(),
            ],
        )?;
        drop(db);
        self.get_channel(id)
    }

    /// True if `candidate` matches the current secret, or the previous
    /// secret while still inside its grace window.
    pub fn verify_channel_secret(&self, channel: &Channel, candidate: &str) -> bool {
        if constant_time_eq(candidate, &channel.hmac_secret) {
            return true;
        }
        if let (Some(prev), Some(grace_until)) =
            (&channel.previous_hmac_secret, channel.secret_grace_until)
        {
            if Utc::now() <= grace_until && constant_time_eq(candidate, prev) {
                return true;
            }
        }
        false
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    let meta_str: String = row.get(3)?;
    let deleted_str: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;
    Ok(Tenant {
        id: row.get::<_, String>(0)?.into(),
        name: row.get(1)?,
        timezone: row.get(2)?,
        metadata: serde_json::from_str(&meta_str).unwrap_or_default(),
        deleted_at: deleted_str.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let type_str: String = row.get(3)?;
    let creds_str: String = row.get(8)?;
    let grace_str: Option<String> = row.get(7)?;
    Ok(Channel {
        id: row.get::<_, String>(0)?.into(),
        tenant_id: row.get::<_, String>(1)?.into(),
        brand_id: row.get::<_, String>(2)?.into(),
        channel_type: ChannelType::from_str(&type_str).unwrap_or(ChannelType::Web),
        display_name: row.get(4)?,
        hmac_secret: row.get(5)?,
        previous_hmac_secret: row.get(6)?,
        secret_grace_until: grace_str.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        credentials: serde_json::from_str(&creds_str).unwrap_or_default(),
        active: row.get::<_, i64>(9)? != 0,
    })
}
