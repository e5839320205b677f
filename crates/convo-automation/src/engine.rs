//! Rule scheduler and job consumer: a cron ticker, an event-bus poller, and
//! a bounded-per-tenant-concurrency job consumer, all driving the same
//! `AutomationJob` table. Grounded directly on
//! `skynet-scheduler::engine::SchedulerEngine::tick`'s poll-and-update shape,
//! split across three independent loops instead of one, since cron rules,
//! event rules, and job execution each have their own cadence.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use convo_core::config::EmailConfig;
use convo_core::types::{AutomationRuleId, TenantId};
use convo_core::ConvoConfig;
use convo_queue::EventLog;
use convo_store::{AutomationJob, AutomationJobStatus, ConvoStore, Trigger};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::dispatch;
use crate::error::Result;
use crate::metrics;

const CRON_TICK: Duration = Duration::from_secs(60);
const EVENT_POLL: Duration = Duration::from_secs(2);
const JOB_POLL: Duration = Duration::from_millis(500);
const JOB_BATCH: u32 = 64;

pub struct AutomationState {
    pub store: ConvoStore,
    pub events: EventLog,
    pub http: reqwest::Client,
    pub email: EmailConfig,
    pub max_concurrency_per_tenant: u32,
    event_cursors: Mutex<HashMap<AutomationRuleId, i64>>,
    tenant_semaphores: DashMap<TenantId, Arc<Semaphore>>,
}

impl AutomationState {
    pub fn new(store: ConvoStore, events: EventLog, config: &ConvoConfig) -> Self {
        Self {
            store,
            events,
            http: reqwest::Client::new(),
            email: config.email.clone(),
            max_concurrency_per_tenant: config.limits.automation_max_concurrency_per_tenant,
            event_cursors: Mutex::new(HashMap::new()),
            tenant_semaphores: DashMap::new(),
        }
    }

    fn semaphore_for(&self, tenant_id: &TenantId) -> Arc<Semaphore> {
        self.tenant_semaphores
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrency_per_tenant.max(1) as usize)))
            .clone()
    }

    /// Cursor for a rule's event stream, seeded to the current tail on first
    /// sight so a newly observed rule doesn't replay the whole event history.
    async fn cursor_for(&self, rule_id: &AutomationRuleId, tenant_id: &str, event_name: &str) -> i64 {
        let mut cursors = self.event_cursors.lock().await;
        if let Some(c) = cursors.get(rule_id) {
            return *c;
        }
        let latest = self
            .events
            .since(tenant_id, event_name, 0)
            .ok()
            .and_then(|rows| rows.last().map(|(id, _)| *id))
            .unwrap_or(0);
        cursors.insert(rule_id.clone(), latest);
        latest
    }

    async fn advance_cursor(&self, rule_id: &AutomationRuleId, new_cursor: i64) {
        self.event_cursors.lock().await.insert(rule_id.clone(), new_cursor);
    }
}

/// Runs the cron ticker, event poller, and job consumer concurrently.
/// Returns only if all three loops exit, which in practice is never.
pub async fn run(state: Arc<AutomationState>) {
    tokio::join!(
        run_cron_ticker(state.clone()),
        run_event_poller(state.clone()),
        run_job_consumer(state),
    );
}

async fn run_cron_ticker(state: Arc<AutomationState>) {
    let mut ticker = tokio::time::interval(CRON_TICK);
    loop {
        ticker.tick().await;
        if let Err(e) = cron_tick(&state).await {
            warn!(error = %e, "cron tick failed");
        }
    }
}

/// A rule fires if its cron expression has a scheduled instant within the
/// window since the last tick (with a few seconds of slack for scheduler
/// jitter), its throttle window has elapsed, and it is still active.
async fn cron_tick(state: &AutomationState) -> Result<()> {
    let now = Utc::now();
    let window_start = now - chrono::Duration::seconds(CRON_TICK.as_secs() as i64 + 5);
    let rules = state.store.list_active_cron_rules()?;

    for rule in rules {
        let Trigger::Cron { expression } = &rule.trigger else { continue };
        let Ok(expr) = cron::Schedule::from_str(expression) else {
            warn!(rule_id = %rule.id, expression, "invalid cron expression, skipping");
            continue;
        };
        let Some(fire_at) = expr.after(&window_start).next() else { continue };
        if fire_at > now {
            continue;
        }
        if !state.store.throttle_elapsed(&rule, now) {
            continue;
        }

        state.store.create_automation_job(&rule.id, now, rule.action_payload.clone())?;
        info!(rule_id = %rule.id, "cron rule fired, job enqueued");
    }
    Ok(())
}

async fn run_event_poller(state: Arc<AutomationState>) {
    let mut ticker = tokio::time::interval(EVENT_POLL);
    loop {
        ticker.tick().await;
        if let Err(e) = event_tick(&state).await {
            warn!(error = %e, "event poll tick failed");
        }
    }
}

async fn event_tick(state: &AutomationState) -> Result<()> {
    let now = Utc::now();
    let rules = state.store.list_active_event_rules()?;

    for rule in rules {
        let Trigger::Event { name } = &rule.trigger else { continue };
        if !state.store.throttle_elapsed(&rule, now) {
            continue;
        }

        let cursor = state.cursor_for(&rule.id, rule.tenant_id.as_str(), name).await;
        let events = state.events.since(rule.tenant_id.as_str(), name, cursor)?;
        let Some((max_id, _)) = events.last() else { continue };
        let max_id = *max_id;

        for (_, event) in &events {
            if condition_matches(&rule.condition, &event.payload) {
                state.store.create_automation_job(&rule.id, now, rule.action_payload.clone())?;
                info!(rule_id = %rule.id, event = %name, "event rule matched, job enqueued");
            }
        }
        state.advance_cursor(&rule.id, max_id).await;
    }
    Ok(())
}

/// A rule with no condition always matches; otherwise every key in the
/// condition must be present in the event payload with an equal value.
fn condition_matches(condition: &Option<Value>, event_payload: &Value) -> bool {
    let Some(condition) = condition else { return true };
    let Some(expected) = condition.as_object() else { return false };
    let Some(actual) = event_payload.as_object() else { return false };
    expected.iter().all(|(k, v)| actual.get(k) == Some(v))
}

async fn run_job_consumer(state: Arc<AutomationState>) {
    let mut ticker = tokio::time::interval(JOB_POLL);
    loop {
        ticker.tick().await;
        let jobs = match state.store.claim_pending_automation_jobs(JOB_BATCH) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to claim pending automation jobs");
                continue;
            }
        };
        metrics::set_queue_depth(jobs.len() as i64);
        for job in jobs {
            let state = state.clone();
            tokio::spawn(async move {
                process_job(&state, job).await;
            });
        }
    }
}

async fn process_job(state: &Arc<AutomationState>, job: AutomationJob) {
    let rule = match state.store.get_automation_rule(&job.rule_id) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, job_id = %job.id, "automation job's rule not found");
            return;
        }
    };

    let permit = state.semaphore_for(&rule.tenant_id).acquire_owned().await;
    let Ok(_permit) = permit else { return };

    let now = Utc::now();
    if !rule.active || !state.store.throttle_elapsed(&rule, now) {
        let _ = state.store.update_automation_job_outcome(
            &job.id,
            AutomationJobStatus::Skipped,
            Some("rule inactive or throttle window not elapsed"),
        );
        metrics::record_outcome("skipped");
        return;
    }

    let outcome =
        dispatch::execute_with_retry(&state.http, &state.email, rule.action_type, &job.payload, rule.max_retries.max(1))
            .await;

    match outcome {
        Ok(()) => {
            let _ = state.store.update_automation_job_outcome(&job.id, AutomationJobStatus::Succeeded, None);
            let _ = state.store.mark_rule_ran(&rule.id, now);
            metrics::record_outcome("succeeded");
            info!(job_id = %job.id, rule_id = %rule.id, "automation job succeeded");
        }
        Err(e) => {
            warn!(error = %e, job_id = %job.id, rule_id = %rule.id, "automation job failed");
            let _ = state.store.update_automation_job_outcome(
                &job.id,
                AutomationJobStatus::Failed,
                Some(&e.to_string()),
            );
            metrics::record_outcome("failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_matches_subset_of_event_fields() {
        let condition = Some(serde_json::json!({"status": "vip"}));
        let event = serde_json::json!({"status": "vip", "order_id": 42});
        assert!(condition_matches(&condition, &event));
    }

    #[test]
    fn condition_rejects_mismatched_value() {
        let condition = Some(serde_json::json!({"status": "vip"}));
        let event = serde_json::json!({"status": "regular"});
        assert!(!condition_matches(&condition, &event));
    }

    #[test]
    fn absent_condition_always_matches() {
        assert!(condition_matches(&None, &serde_json::json!({"anything": true})));
    }

    #[tokio::test]
    async fn event_rule_enqueues_job_only_on_matching_event() {
        let store = ConvoStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let events = EventLog::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let tenant = store.create_tenant("acme", "UTC", Default::default()).unwrap();
        let brand = store.create_brand(&tenant.id, "b").unwrap();
        let rule = store
            .create_automation_rule(
                &tenant.id,
                &brand.id,
                Trigger::Event { name: "order.created".into() },
                Some(serde_json::json!({"vip": true})),
                convo_store::ActionType::Webhook,
                serde_json::json!({"url": "https://example.com/hook"}),
                0,
                1,
            )
            .unwrap();

        events
            .publish(&convo_queue::DomainEvent {
                name: "order.created".into(),
                tenant_id: tenant.id.as_str().to_string(),
                payload: serde_json::json!({"vip": false}),
            })
            .unwrap();
        events
            .publish(&convo_queue::DomainEvent {
                name: "order.created".into(),
                tenant_id: tenant.id.as_str().to_string(),
                payload: serde_json::json!({"vip": true}),
            })
            .unwrap();

        let state = AutomationState {
            store,
            events,
            http: reqwest::Client::new(),
            email: EmailConfig::default(),
            max_concurrency_per_tenant: 4,
            event_cursors: Mutex::new(HashMap::new()),
            tenant_semaphores: DashMap::new(),
        };
        // Seed the cursor before any events existed so both publishes above count as new.
        state.event_cursors.lock().await.insert(rule.id.clone(), 0);

        event_tick(&state).await.unwrap();

        let jobs = state.store.list_automation_jobs_for_tenant(&tenant.id, 0, 10).unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
