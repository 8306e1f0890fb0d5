//! GET|PUT /admin/model-swap-config
//!
//! In-process only: reverts to the environment defaults on restart.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::auth::AdminAuth;
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSwapConfig {
    pub enabled: bool,
    pub mapping: HashMap<String, String>,
}

pub async fn get_config(_admin: AdminAuth, State(state): State<Arc<AppState>>) -> Json<ModelSwapConfig> {
    let (enabled, mapping) = state.model_swap.snapshot().await;
    Json(ModelSwapConfig { enabled, mapping })
}

pub async fn put_config(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(config): Json<ModelSwapConfig>,
) -> Result<Json<ModelSwapConfig>> {
    state.model_swap.set(config.enabled, config.mapping.clone()).await;
    tracing::info!(enabled = config.enabled, mapping_size = config.mapping.len(), "model-swap config updated");
    Ok(Json(config))
}
