//! Backend registry admin endpoints, mounted under /admin/backends

use std::sync::Arc;

use axum::{extract::{Path, State}, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AdminAuth};
use crate::backend::{self, BackendConfig, BackendConfigUpdate};
use crate::error::{Error, Result};
use crate::AppState;

/// Omits `api_key` from every view the admin API returns, mirroring the
/// tenant-key plaintext-on-creation-only convention for upstream credentials.
#[derive(Debug, Serialize)]
pub struct BackendView {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BackendConfig> for BackendView {
    fn from(b: BackendConfig) -> Self {
        Self {
            id: b.id,
            name: b.name,
            base_url: b.base_url,
            is_active: b.is_active,
            is_default: b.is_default,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn create(_admin: AdminAuth, State(state): State<Arc<AppState>>, Json(req): Json<CreateRequest>) -> Result<Json<BackendView>> {
    let row = backend::create(&state.db, &req.name, &req.base_url, &req.api_key, req.is_default).await?;
    tracing::info!(backend_id = %row.id, name = %row.name, "backend created");
    Ok(Json(row.into()))
}

pub async fn list(_admin: AdminAuth, State(state): State<Arc<AppState>>) -> Result<Json<Vec<BackendView>>> {
    let rows = backend::list(&state.db).await?;
    Ok(Json(rows.into_iter().map(BackendView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

pub async fn update(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<BackendView>> {
    let id = auth::parse_id(&id)?;
    let updated = backend::update(
        &state.db,
        id,
        BackendConfigUpdate { name: req.name, base_url: req.base_url, api_key: req.api_key },
    )
    .await?;
    if !updated {
        return Err(Error::NotFound(format!("backend {id} not found")));
    }
    let rows = backend::list(&state.db).await?;
    let row = rows.into_iter().find(|b| b.id == id).ok_or_else(|| Error::NotFound(format!("backend {id} not found")))?;
    Ok(Json(row.into()))
}

pub async fn delete(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let id = auth::parse_id(&id)?;
    let deleted = backend::delete(&state.db, id).await?;
    if !deleted {
        return Err(Error::NotFound(format!("backend {id} not found")));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

pub async fn activate(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let id = auth::parse_id(&id)?;
    let activated = backend::activate(&state.db, id).await?;
    if !activated {
        return Err(Error::NotFound(format!("backend {id} not found")));
    }
    Ok(Json(serde_json::json!({"activated": true})))
}

pub async fn set_default(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let id = auth::parse_id(&id)?;
    let set = backend::set_default(&state.db, id).await?;
    if !set {
        return Err(Error::NotFound(format!("backend {id} not found")));
    }
    Ok(Json(serde_json::json!({"is_default": true})))
}
