use rusqlite::{Connection, Result};

/// Create every table this crate owns. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_tenant_tables(conn)?;
    create_conversation_tables(conn)?;
    create_policy_tables(conn)?;
    create_ingestion_tables(conn)?;
    create_automation_tables(conn)?;
    create_audit_table(conn)?;
    Ok(())
}

fn create_tenant_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenants (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            timezone    TEXT NOT NULL DEFAULT 'UTC',
            metadata    TEXT NOT NULL DEFAULT '{}',
            deleted_at  TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS brands (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL REFERENCES tenants(id),
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_brands_tenant ON brands(tenant_id);
        CREATE TABLE IF NOT EXISTS channels (
            id                   TEXT PRIMARY KEY,
            tenant_id            TEXT NOT NULL REFERENCES tenants(id),
            brand_id             TEXT NOT NULL REFERENCES brands(id),
            channel_type         TEXT NOT NULL,
            display_name         TEXT NOT NULL,
            hmac_secret          TEXT NOT NULL,
            previous_hmac_secret TEXT,
            secret_grace_until   TEXT,
            credentials          TEXT NOT NULL DEFAULT '{}',
            active               INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_channels_tenant ON channels(tenant_id);",
    )
}

fn create_conversation_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            tenant_id           TEXT NOT NULL,
            brand_id            TEXT NOT NULL,
            channel_id          TEXT NOT NULL,
            external_sender_id  TEXT NOT NULL,
            last_message_at     TEXT NOT NULL,
            UNIQUE(channel_id, external_sender_id)
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_tenant ON conversations(tenant_id);
        CREATE TABLE IF NOT EXISTS message_logs (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            direction        TEXT NOT NULL,
            content          TEXT NOT NULL,
            metadata         TEXT NOT NULL DEFAULT '{}',
            correlation_id   TEXT,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON message_logs(conversation_id, created_at);",
    )
}

fn create_policy_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS policy_versions (
            id            TEXT PRIMARY KEY,
            tenant_id     TEXT NOT NULL,
            version       INTEGER NOT NULL,
            status        TEXT NOT NULL,
            policy_json   TEXT NOT NULL,
            published_at  TEXT,
            UNIQUE(tenant_id, version)
        );
        CREATE INDEX IF NOT EXISTS idx_policy_tenant ON policy_versions(tenant_id, status);
        CREATE TABLE IF NOT EXISTS retrieval_configs (
            tenant_id             TEXT PRIMARY KEY,
            hybrid_weight         REAL NOT NULL DEFAULT 0.5,
            min_score             REAL NOT NULL DEFAULT 0.2,
            max_documents         INTEGER NOT NULL DEFAULT 8,
            context_budget_tokens INTEGER NOT NULL DEFAULT 2000,
            filters               TEXT NOT NULL DEFAULT 'null',
            fallback_llm          TEXT
        );",
    )
}

fn create_ingestion_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge_assets (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            brand_id    TEXT NOT NULL,
            object_key  TEXT NOT NULL,
            title       TEXT NOT NULL,
            visibility  TEXT NOT NULL DEFAULT 'private',
            status      TEXT NOT NULL,
            sha256      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(tenant_id, brand_id, sha256)
        );
        CREATE INDEX IF NOT EXISTS idx_assets_tenant ON knowledge_assets(tenant_id);
        CREATE TABLE IF NOT EXISTS ingestion_jobs (
            id                TEXT PRIMARY KEY,
            asset_id          TEXT NOT NULL REFERENCES knowledge_assets(id),
            status            TEXT NOT NULL,
            attempts          INTEGER NOT NULL DEFAULT 0,
            max_retries       INTEGER NOT NULL DEFAULT 5,
            total_chunks      INTEGER NOT NULL DEFAULT 0,
            processed_chunks  INTEGER NOT NULL DEFAULT 0,
            failure_reason    TEXT,
            visible_until     TEXT NOT NULL,
            logs              TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_asset ON ingestion_jobs(asset_id);
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON ingestion_jobs(status, visible_until);",
    )
}

fn create_automation_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS automation_rules (
            id                TEXT PRIMARY KEY,
            tenant_id         TEXT NOT NULL,
            brand_id          TEXT NOT NULL,
            trigger           TEXT NOT NULL,
            condition         TEXT,
            action_type       TEXT NOT NULL,
            action_payload    TEXT NOT NULL,
            throttle_seconds  INTEGER NOT NULL DEFAULT 0,
            max_retries       INTEGER NOT NULL DEFAULT 3,
            active            INTEGER NOT NULL DEFAULT 1,
            last_run_at       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_rules_tenant ON automation_rules(tenant_id);
        CREATE TABLE IF NOT EXISTS automation_jobs (
            id              TEXT PRIMARY KEY,
            rule_id         TEXT NOT NULL REFERENCES automation_rules(id),
            status          TEXT NOT NULL,
            attempts        INTEGER NOT NULL DEFAULT 0,
            scheduled_for   TEXT NOT NULL,
            payload         TEXT NOT NULL,
            failure_reason  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_automation_jobs_rule ON automation_jobs(rule_id);
        CREATE INDEX IF NOT EXISTS idx_automation_jobs_status
            ON automation_jobs(status, scheduled_for);",
    )
}

fn create_audit_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id   TEXT,
            actor       TEXT NOT NULL,
            action      TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log(tenant_id, created_at);",
    )
}
