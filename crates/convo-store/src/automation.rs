use std::str::FromStr;

use chrono::{DateTime, Utc};
use convo_core::types::{AutomationJobId, AutomationRuleId, BrandId, TenantId};

use crate::error::{Result, StoreError};
use crate::store::ConvoStore;
use crate::types::{ActionType, AutomationJob, AutomationJobStatus, AutomationRule, Trigger};

impl ConvoStore {
    pub fn create_automation_rule(
        &self,
        tenant_id: &TenantId,
        brand_id: &BrandId,
        trigger: Trigger,
        condition: Option<serde_json::Value>,
        action_type: ActionType,
        action_payload: serde_json::Value,
        throttle_seconds: i64,
        max_retries: u32,
    ) -> Result<AutomationRule> {
        let rule = AutomationRule {
            id: AutomationRuleId::new(),
            tenant_id: tenant_id.clone(),
            brand_id: brand_id.clone(),
            trigger,
            condition,
            action_type,
            action_payload,
            throttle_seconds,
            max_retries,
            active: true,
            last_run_at: None,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO automation_rules
             (id, tenant_id, brand_id, trigger, condition, action_type, action_payload,
              throttle_seconds, max_retries, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                rule.id.as_str(),
                rule.tenant_id.as_str(),
                rule.brand_id.as_str(),
                serde_json::to_string(&rule.trigger)?,
                rule.condition.as_ref().map(|c| c.to_string()),
                rule.action_type.to_string(),
                rule.action_payload.to_string(),
                rule.throttle_seconds,
                rule.max_retries,
                rule.active as i64,
            ],
        )?;
        Ok(rule)
    }

    pub fn get_automation_rule(&self, id: &AutomationRuleId) -> Result<AutomationRule> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, brand_id, trigger, condition, action_type, action_payload,
                    throttle_seconds, max_retries, active, last_run_at
             FROM automation_rules WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_rule,
        )
        .map_err(|_| StoreError::NotFound(format!("automation rule {id}")))
    }

    pub fn set_rule_active(&self, id: &AutomationRuleId, active: bool) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE automation_rules SET active = ?1 WHERE id = ?2",
            rusqlite::params![active as i64, id.as_str()],
        )?;
        Ok(())
    }

    /// All active rules with a cron trigger, for the scheduler's per-tick scan.
    pub fn list_active_cron_rules(&self) -> Result<Vec<AutomationRule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, brand_id, trigger, condition, action_type, action_payload,
                    throttle_seconds, max_retries, active, last_run_at
             FROM automation_rules WHERE active = 1",
        )?;
        let rows = stmt.query_map([], row_to_rule)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter(|r| matches!(r.trigger, Trigger::Cron { .. }))
            .collect())
    }

    /// All active rules with an event trigger, for the worker's event-bus poll.
    pub fn list_active_event_rules(&self) -> Result<Vec<AutomationRule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, brand_id, trigger, condition, action_type, action_payload,
                    throttle_seconds, max_retries, active, last_run_at
             FROM automation_rules WHERE active = 1",
        )?;
        let rows = stmt.query_map([], row_to_rule)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter(|r| matches!(r.trigger, Trigger::Event { .. }))
            .collect())
    }

    /// `last_run_at + throttle_seconds <= now()` required before refire.
    pub fn throttle_elapsed(&self, rule: &AutomationRule, now: DateTime<Utc>) -> bool {
        match rule.last_run_at {
            None => true,
            Some(last) => (now - last).num_seconds() >= rule.throttle_seconds,
        }
    }

    pub fn mark_rule_ran(&self, id: &AutomationRuleId, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE automation_rules SET last_run_at = ?1 WHERE id = ?2",
            rusqlite::params![at.to_rfc3339(), id.as_str()],
        )?;
        Ok(())
    }

    pub fn create_automation_job(
        &self,
        rule_id: &AutomationRuleId,
        scheduled_for: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<AutomationJob> {
        let job = AutomationJob {
            id: AutomationJobId::new(),
            rule_id: rule_id.clone(),
            status: AutomationJobStatus::Pending,
            attempts: 0,
            scheduled_for,
            payload,
            failure_reason: None,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO automation_jobs (id, rule_id, status, attempts, scheduled_for, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                job.id.as_str(),
                job.rule_id.as_str(),
                job.status.to_string(),
                job.attempts,
                job.scheduled_for.to_rfc3339(),
                job.payload.to_string(),
            ],
        )?;
        Ok(job)
    }

    pub fn update_automation_job_outcome(
        &self,
        id: &AutomationJobId,
        status: AutomationJobStatus,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE automation_jobs SET status = ?1, attempts = attempts + 1, failure_reason = ?2
             WHERE id = ?3",
            rusqlite::params![status.to_string(), failure_reason, id.as_str()],
        )?;
        Ok(())
    }

    /// Atomically flips up to `limit` pending jobs (oldest-first) to
    /// `running` and returns them, so two consumer ticks never dispatch the
    /// same job twice. Mirrors `claim_next_ingestion_job`'s claim-then-return
    /// shape without needing a visibility timeout, since automation jobs run
    /// to completion within a single tick rather than across a worker crash
    /// recovery window.
    pub fn claim_pending_automation_jobs(&self, limit: u32) -> Result<Vec<AutomationJob>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, rule_id, status, attempts, scheduled_for, payload, failure_reason
             FROM automation_jobs WHERE status = 'pending'
             ORDER BY scheduled_for ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit], row_to_job)?;
        let jobs: Vec<AutomationJob> = rows.filter_map(|r| r.ok()).collect();
        for job in &jobs {
            db.execute(
                "UPDATE automation_jobs SET status = 'running' WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![job.id.as_str()],
            )?;
        }
        Ok(jobs)
    }

    /// Jobs for a tenant's rules, newest-first, for the admin listing endpoint.
    pub fn list_automation_jobs_for_tenant(
        &self,
        tenant_id: &TenantId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<AutomationJob>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT j.id, j.rule_id, j.status, j.attempts, j.scheduled_for, j.payload, j.failure_reason
             FROM automation_jobs j
             JOIN automation_rules r ON r.id = j.rule_id
             WHERE r.tenant_id = ?1
             ORDER BY j.scheduled_for DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![tenant_id.as_str(), limit, offset],
            row_to_job,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutomationRule> {
    let trigger_str: String = row.get(3)?;
    let condition_str: Option<String> = row.get(4)?;
    let action_str: String = row.get(5)?;
    let payload_str: String = row.get(6)?;
    let last_run_str: Option<String> = row.get(10)?;
    Ok(AutomationRule {
        id: row.get::<_, String>(0)?.into(),
        tenant_id: row.get::<_, String>(1)?.into(),
        brand_id: row.get::<_, String>(2)?.into(),
        trigger: serde_json::from_str(&trigger_str).unwrap_or(Trigger::Event { name: String::new() }),
        condition: condition_str.and_then(|s| serde_json::from_str(&s).ok()),
        action_type: ActionType::from_str(&action_str).unwrap_or(ActionType::Webhook),
        action_payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        throttle_seconds: row.get(7)?,
        max_retries: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
        last_run_at: last_run_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutomationJob> {
    let status_str: String = row.get(2)?;
    let scheduled_str: String = row.get(4)?;
    let payload_str: String = row.get(5)?;
    Ok(AutomationJob {
        id: row.get::<_, String>(0)?.into(),
        rule_id: row.get::<_, String>(1)?.into(),
        status: AutomationJobStatus::from_str(&status_str).unwrap_or(AutomationJobStatus::Pending),
        attempts: row.get(3)?,
        scheduled_for: DateTime::parse_from_rfc3339(&scheduled_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        failure_reason: row.get(6)?,
    })
}
