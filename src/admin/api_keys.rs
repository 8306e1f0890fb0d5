//! Tenant key admin endpoints, mounted under /admin/api-keys

use std::sync::Arc;

use axum::{extract::{Path, State}, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AdminAuth};
use crate::error::{Error, Result};
use crate::limiter;
use crate::tenant_key::{self, NewTenantKey, TenantKey, TenantKeyUpdate};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TenantKeyView {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub rate_limit: i64,
    pub quota_limit: i64,
    pub cost_limit: f64,
    pub daily_quota: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<TenantKey> for TenantKeyView {
    fn from(k: TenantKey) -> Self {
        Self {
            id: k.id,
            name: k.name,
            is_active: k.is_active,
            rate_limit: k.rate_limit,
            quota_limit: k.quota_limit,
            cost_limit: k.cost_limit,
            daily_quota: k.daily_quota,
            created_at: k.created_at,
            last_used_at: k.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedTenantKey {
    #[serde(flatten)]
    pub key: TenantKeyView,
    pub key_value: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub rate_limit: Option<i64>,
    pub quota_limit: Option<i64>,
    pub cost_limit: Option<f64>,
    pub daily_quota: Option<f64>,
}

pub async fn create(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreatedTenantKey>> {
    let (row, plaintext) = tenant_key::create(
        &state.db,
        NewTenantKey {
            name: req.name,
            rate_limit: req.rate_limit,
            quota_limit: req.quota_limit,
            cost_limit: req.cost_limit,
            daily_quota: req.daily_quota,
        },
        state.config.default_rate_limit,
        state.config.default_quota_limit as f64,
    )
    .await?;

    tracing::info!(key_id = %row.id, name = %row.name, "tenant key created");
    Ok(Json(CreatedTenantKey { key: row.into(), key_value: plaintext }))
}

pub async fn list(_admin: AdminAuth, State(state): State<Arc<AppState>>) -> Result<Json<Vec<TenantKeyView>>> {
    let rows = tenant_key::list(&state.db).await?;
    Ok(Json(rows.into_iter().map(TenantKeyView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub rate_limit: Option<i64>,
    pub quota_limit: Option<i64>,
    pub cost_limit: Option<f64>,
    pub daily_quota: Option<f64>,
}

pub async fn update(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<TenantKeyView>> {
    let id = auth::parse_id(&id)?;
    let updated = tenant_key::update(
        &state.db,
        id,
        TenantKeyUpdate {
            name: req.name,
            rate_limit: req.rate_limit,
            quota_limit: req.quota_limit,
            cost_limit: req.cost_limit,
            daily_quota: req.daily_quota,
        },
    )
    .await?;
    if !updated {
        return Err(Error::NotFound(format!("tenant key {id} not found")));
    }
    let row = tenant_key::get_by_id(&state.db, id).await?.ok_or_else(|| Error::NotFound(format!("tenant key {id} not found")))?;
    Ok(Json(row.into()))
}

/// Soft delete: deactivates the key, leaves its ledger rows intact.
pub async fn deactivate(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let id = auth::parse_id(&id)?;
    let deactivated = tenant_key::deactivate(&state.db, id).await?;
    if !deactivated {
        return Err(Error::NotFound(format!("tenant key {id} not found")));
    }
    Ok(Json(serde_json::json!({"deactivated": true})))
}

pub async fn regenerate(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<CreatedTenantKey>> {
    let id = auth::parse_id(&id)?;
    let (row, plaintext) = tenant_key::regenerate(&state.db, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant key {id} not found")))?;
    Ok(Json(CreatedTenantKey { key: row.into(), key_value: plaintext }))
}

async fn load_key(state: &AppState, id: &str) -> Result<TenantKey> {
    let id = auth::parse_id(id)?;
    tenant_key::get_by_id(&state.db, id).await?.ok_or_else(|| Error::NotFound(format!("tenant key {id} not found")))
}

#[derive(Debug, Serialize)]
pub struct LimitStatusView {
    pub limit: f64,
    pub current_usage: f64,
    pub remaining: f64,
    pub reset_time: chrono::DateTime<chrono::Utc>,
    pub unlimited: bool,
}

impl From<limiter::LimitInfo> for LimitStatusView {
    fn from(i: limiter::LimitInfo) -> Self {
        Self { limit: i.limit, current_usage: i.current_usage, remaining: i.remaining, reset_time: i.reset_time, unlimited: i.unlimited }
    }
}

/// Recomputes the rate check without the admission gate; never denies.
pub async fn rate_limit_status(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<LimitStatusView>> {
    let key = load_key(&state, &id).await?;
    let (_, info) = limiter::check_rate_limit(&state.db, key.id, key.rate_limit).await?;
    Ok(Json(info.into()))
}

pub async fn cost_limit_status(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<LimitStatusView>> {
    let key = load_key(&state, &id).await?;
    let (_, info) = limiter::check_cost_limit(&state.db, key.id, key.cost_limit).await?;
    Ok(Json(info.into()))
}

pub async fn daily_quota_status(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<LimitStatusView>> {
    let key = load_key(&state, &id).await?;
    let (_, info) = limiter::check_daily_quota(&state.db, key.id, key.daily_quota).await?;
    Ok(Json(info.into()))
}
