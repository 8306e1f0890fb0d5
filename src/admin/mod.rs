//! Admin API (C11) - a JSON surface separate from the client-facing proxy.
//!
//! Every route except `/admin/login` requires a valid admin bearer token.

pub mod api_keys;
pub mod backends;
pub mod login;
pub mod model_swap;
pub mod usage;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/login", post(login::login))
        .route("/admin/api-keys", post(api_keys::create).get(api_keys::list))
        .route("/admin/api-keys/:id", put(api_keys::update).delete(api_keys::deactivate))
        .route("/admin/api-keys/:id/regenerate", post(api_keys::regenerate))
        .route("/admin/api-keys/:id/rate-limit-status", get(api_keys::rate_limit_status))
        .route("/admin/api-keys/:id/cost-limit-status", get(api_keys::cost_limit_status))
        .route("/admin/api-keys/:id/daily-quota-status", get(api_keys::daily_quota_status))
        .route("/admin/model-swap-config", get(model_swap::get_config).put(model_swap::put_config))
        .route("/admin/backends", post(backends::create).get(backends::list))
        .route("/admin/backends/:id", put(backends::update).delete(backends::delete))
        .route("/admin/backends/:id/activate", post(backends::activate))
        .route("/admin/backends/:id/set-default", post(backends::set_default))
        .route("/usage/summary", get(usage::summary))
        .route("/usage/chart", get(usage::chart_global))
        .route("/usage/stats/:key_id", get(usage::stats))
        .route("/usage/records/:key_id", get(usage::records))
        .route("/usage/chart/:key_id", get(usage::chart_for_key))
        .route("/usage/aggregate", post(usage::aggregate))
}
