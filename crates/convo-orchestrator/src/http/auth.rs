//! Admin JWT verification. Every `/admin/*` route requires a bearer token
//! signed with `admin_jwt.secret`, carrying a `scope` claim of either
//! `platform_admin` (tenant-unscoped) or `tenant_operator` (pinned to the
//! `tenant_id` claim).

use std::str::FromStr;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use convo_core::types::{AdminScope, TenantId};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    scope: String,
    tenant_id: Option<String>,
    iss: String,
    aud: String,
    exp: usize,
}

#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub subject: String,
    pub scope: AdminScope,
    pub tenant_id: Option<TenantId>,
}

impl AdminIdentity {
    /// Platform admins can act on any tenant; operators only on their own.
    pub fn authorize_tenant(&self, tenant_id: &TenantId) -> bool {
        self.scope.is_platform_admin() || self.tenant_id.as_ref() == Some(tenant_id)
    }
}

pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AdminIdentity, (StatusCode, Json<Value>)> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("expected a bearer token"))?;

    let mut validation = Validation::default();
    validation.set_issuer(&[&state.config.admin_jwt.issuer]);
    validation.set_audience(&[&state.config.admin_jwt.audience]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.admin_jwt.secret.as_bytes()),
        &validation,
    )
    .map_err(|_| unauthorized("invalid or expired token"))?;

    let scope = AdminScope::from_str(&data.claims.scope)
        .map_err(|_| unauthorized("unrecognized scope claim"))?;

    Ok(AdminIdentity {
        subject: data.claims.sub,
        scope,
        tenant_id: data.claims.tenant_id.map(TenantId::from),
    })
}

/// Extractor-style helper for handlers: authenticate, then require the
/// caller be authorized for `tenant_id`.
pub fn require_tenant_access(
    state: &AppState,
    headers: &HeaderMap,
    tenant_id: &TenantId,
) -> Result<AdminIdentity, (StatusCode, Json<Value>)> {
    let identity = authenticate(state, headers)?;
    if !identity.authorize_tenant(tenant_id) {
        return Err((StatusCode::FORBIDDEN, Json(json!({"error": "not authorized for this tenant"}))));
    }
    Ok(identity)
}

pub fn require_platform_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AdminIdentity, (StatusCode, Json<Value>)> {
    let identity = authenticate(state, headers)?;
    if !identity.scope.is_platform_admin() {
        return Err((StatusCode::FORBIDDEN, Json(json!({"error": "platform_admin scope required"}))));
    }
    Ok(identity)
}

fn unauthorized(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": message})))
}
