//! Operator-facing admin surface: knowledge asset uploads, ingestion job
//! visibility, automation rule CRUD, and policy draft/publish/diff. Every
//! route here runs behind `http::auth`; tenant-scoped routes additionally
//! require the caller's token be authorized for the `tenant_id` in the URL.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use convo_core::types::{AutomationRuleId, BrandId, PolicyVersionId, TenantId};
use convo_core::ObjectStore;
use convo_store::{ActionType, Trigger};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::app::AppState;
use crate::http::auth::require_tenant_access;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/knowledge_assets/upload", post(upload_asset))
        .route("/ingestion_jobs", get(list_ingestion_jobs))
        .route("/automation/rules", post(create_rule))
        .route("/automation/test", post(test_rule))
        .route("/automation/rules/{id}/pause", post(pause_rule))
        .route("/automation/rules/{id}/resume", post(resume_rule))
        .route("/automation/jobs", get(list_automation_jobs))
        .route("/policies/{tenant_id}/draft", post(draft_policy))
        .route("/policies/{tenant_id}/publish", post(publish_policy))
        .route("/policies/{tenant_id}/diff/{version}", get(diff_policy))
}

fn err(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message.into()})))
}

// ---------------------------------------------------------------------
// Knowledge assets / ingestion jobs
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UploadAssetRequest {
    pub tenant_id: String,
    pub brand_id: String,
    pub title: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    /// Base64-encoded file content. Mutually exclusive with `object_key`:
    /// when present, its sha256 becomes the content-address for dedup and
    /// `object_key` is derived from it.
    pub content: Option<String>,
    /// Pre-uploaded object key for content that already landed in the
    /// object store out of band (e.g. via a signed upload URL).
    pub object_key: Option<String>,
}

fn default_visibility() -> String {
    "private".to_string()
}

#[derive(Debug, serde::Serialize)]
struct UploadAssetResponse {
    asset_id: String,
    ingestion_job_id: String,
    created: bool,
}

async fn upload_asset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UploadAssetRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(req.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;
    let brand_id = BrandId::from(req.brand_id);

    let (object_key, sha256) = match (&req.content, &req.object_key) {
        (Some(content), _) => {
            let bytes = STANDARD
                .decode(content)
                .map_err(|_| err(StatusCode::BAD_REQUEST, "content is not valid base64"))?;
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            let sha256 = hex::encode(hasher.finalize());
            let object_key = format!("knowledge/{}/{}/{}", tenant_id.as_str(), brand_id.as_str(), sha256);
            state
                .object_store
                .put(&object_key, &bytes)
                .await
                .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            (object_key, sha256)
        }
        (None, Some(object_key)) => {
            // Out-of-band uploads don't give us the bytes to hash; address by
            // the object key itself so re-registering the same key is a no-op.
            let mut hasher = Sha256::new();
            hasher.update(object_key.as_bytes());
            (object_key.clone(), hex::encode(hasher.finalize()))
        }
        (None, None) => {
            return Err(err(StatusCode::BAD_REQUEST, "either content or object_key is required"));
        }
    };

    let (asset, created) = state
        .store
        .create_or_get_knowledge_asset(&tenant_id, &brand_id, &object_key, &req.title, &req.visibility, &sha256)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let job = if created {
        Some(
            state
                .store
                .create_ingestion_job(&asset.id, state.config.limits.ingest_max_attempts)
                .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        )
    } else {
        None
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAssetResponse {
            asset_id: asset.id.as_str().to_string(),
            ingestion_job_id: job.map(|j| j.id.as_str().to_string()).unwrap_or_default(),
            created,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub tenant_id: String,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    50
}

async fn list_ingestion_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(q.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let jobs = state
        .store
        .list_ingestion_jobs(&tenant_id, q.offset, q.limit)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(jobs))
}

// ---------------------------------------------------------------------
// Automation rules
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub tenant_id: String,
    pub brand_id: String,
    pub trigger: Trigger,
    pub condition: Option<Value>,
    pub action_type: ActionType,
    pub action_payload: Value,
    #[serde(default = "default_throttle_seconds")]
    pub throttle_seconds: i64,
    #[serde(default = "default_rule_max_retries")]
    pub max_retries: u32,
}

fn default_throttle_seconds() -> i64 {
    300
}

fn default_rule_max_retries() -> u32 {
    3
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(req.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;
    let brand_id = BrandId::from(req.brand_id);

    let rule = state
        .store
        .create_automation_rule(
            &tenant_id,
            &brand_id,
            req.trigger,
            req.condition,
            req.action_type,
            req.action_payload,
            req.throttle_seconds,
            req.max_retries,
        )
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    pub tenant_id: String,
    pub condition: Option<Value>,
    /// A sample event payload, shaped the way a real trigger would deliver
    /// one, to dry-run the condition against without persisting a job.
    pub sample_event: Value,
}

/// A condition is a flat map of `field -> expected value` matched against
/// the top-level keys of `sample_event`. Absent a condition, the rule
/// always matches (unconditional trigger).
fn condition_matches(condition: &Option<Value>, sample_event: &Value) -> bool {
    let Some(condition) = condition else { return true };
    let Some(expected) = condition.as_object() else { return false };
    let Some(actual) = sample_event.as_object() else { return false };
    expected.iter().all(|(k, v)| actual.get(k) == Some(v))
}

async fn test_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TestRuleRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(req.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let matched = condition_matches(&req.condition, &req.sample_event);
    Ok(Json(json!({"would_fire": matched})))
}

#[derive(Debug, Deserialize)]
pub struct RulePathParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct TenantScopedQuery {
    pub tenant_id: String,
}

async fn pause_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(params): Path<RulePathParams>,
    Query(q): Query<TenantScopedQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    set_rule_active(&state, &headers, &params.id, &q.tenant_id, false).await
}

async fn resume_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(params): Path<RulePathParams>,
    Query(q): Query<TenantScopedQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    set_rule_active(&state, &headers, &params.id, &q.tenant_id, true).await
}

async fn set_rule_active(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    rule_id: &str,
    tenant_id: &str,
    active: bool,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(tenant_id.to_string());
    require_tenant_access(state, headers, &tenant_id)?;

    let rule_id = AutomationRuleId::from(rule_id.to_string());
    let rule = state
        .store
        .get_automation_rule(&rule_id)
        .map_err(|_| err(StatusCode::NOT_FOUND, "automation rule not found"))?;
    if rule.tenant_id != tenant_id {
        return Err(err(StatusCode::NOT_FOUND, "automation rule not found"));
    }

    state
        .store
        .set_rule_active(&rule_id, active)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_automation_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(q.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let jobs = state
        .store
        .list_automation_jobs_for_tenant(&tenant_id, q.offset, q.limit)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(jobs))
}

// ---------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TenantPathParams {
    pub tenant_id: String,
}

async fn draft_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(params): Path<TenantPathParams>,
    Json(policy_json): Json<Value>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(params.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let policy = state
        .store
        .create_draft_policy(&tenant_id, policy_json)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((StatusCode::CREATED, Json(policy)))
}

#[derive(Debug, Deserialize)]
pub struct PublishPolicyRequest {
    pub policy_version_id: String,
}

async fn publish_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(params): Path<TenantPathParams>,
    Json(req): Json<PublishPolicyRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(params.tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let policy_id = PolicyVersionId::from(req.policy_version_id);
    let draft = state
        .store
        .get_policy(&policy_id)
        .map_err(|_| err(StatusCode::NOT_FOUND, "policy version not found"))?;
    if draft.tenant_id != tenant_id {
        return Err(err(StatusCode::NOT_FOUND, "policy version not found"));
    }

    let published = state
        .store
        .publish_policy(&policy_id)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state.invalidate_tenant_caches(&tenant_id);

    Ok(Json(published))
}

async fn diff_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((tenant_id, version)): Path<(String, i64)>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let tenant_id = TenantId::from(tenant_id);
    require_tenant_access(&state, &headers, &tenant_id)?;

    let target = state
        .store
        .get_policy_by_version(&tenant_id, version)
        .map_err(|_| err(StatusCode::NOT_FOUND, "policy version not found"))?;

    let published = state
        .store
        .get_published_policy(&tenant_id)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "target_version": target.version,
        "target_policy": target.policy_json,
        "published_version": published.as_ref().map(|p| p.version),
        "published_policy": published.as_ref().map(|p| &p.policy_json),
    })))
}
