//! Liveness/readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database_reachable: bool,
    pub backend_configured: bool,
}

#[derive(Serialize)]
pub struct BannerResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub surface: &'static [&'static str],
}

pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        service: "claude-tollgate",
        version: env!("CARGO_PKG_VERSION"),
        surface: &["/v1/*", "/admin/*", "/usage/*", "/health", "/ready"],
    })
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "claude-tollgate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness requires a reachable database and at least one active-or-default
/// backend row; either condition failing returns 503.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let database_reachable = crate::db::health_check(&state.db).await.is_ok();
    let backend_configured = crate::backend::get_active_or_default(&state.db)
        .await
        .ok()
        .flatten()
        .is_some();

    let ready = database_reachable && backend_configured;
    let response = ReadinessResponse {
        status: if ready { "ready" } else { "degraded" },
        database_reachable,
        backend_configured,
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}
