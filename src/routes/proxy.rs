//! Proxy pipeline handler (C8)
//!
//! Mounted at `/v1/*endpoint`, accepts any method. Auth and admission run
//! inline; metering is spawned as a background task after the response body
//! is already known.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};

use crate::auth::TenantAuth;
use crate::error::{Error, Result};
use crate::ledger::NewUsageRecord;
use crate::meter;
use crate::model_rewrite;
use crate::proxy;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/*endpoint", any(handle))
}

async fn handle(
    State(state): State<Arc<AppState>>,
    Path(endpoint): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    TenantAuth(key): TenantAuth,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<axum::body::Body>> {
    let started = Instant::now();

    // 2. Admission.
    crate::limiter::check_all(&state.db, key.id, key.rate_limit, key.cost_limit, key.daily_quota).await?;

    // 3. Select backend.
    let backend = crate::backend::get_active_or_default(&state.db).await?.ok_or(Error::NoBackend)?;

    // 4. Build upstream request.
    let client_used_bearer = headers.get(axum::http::header::AUTHORIZATION).is_some();
    let upstream_headers = proxy::build_upstream_headers(&headers, &backend, client_used_bearer);
    let url = proxy::upstream_url(&backend, &endpoint, query.as_deref());

    let (enabled, mapping) = state.model_swap.snapshot().await;
    let rewritten_body = model_rewrite::rewrite(&body, enabled, &mapping);

    tracing::debug!(endpoint = %endpoint, tenant_key = %key.name, "proxying request");

    // 5-7. Stream upstream, shield empty body, build client response.
    let upstream = proxy::relay(&state.http_client, method.clone(), &url, upstream_headers, Bytes::from(rewritten_body)).await?;

    let status = upstream.status;
    let response_headers = upstream.headers.clone();
    let response_body = upstream.body.clone();

    // 8. Background metering - fire and forget.
    let pool = state.db.clone();
    let api_key_id = key.id;
    let request_size = body.len() as i64;
    let response_size = upstream.body.len() as i64;
    let status_code = status.as_u16() as i32;
    let endpoint_for_meter = endpoint.clone();
    let method_for_meter = method.to_string();
    let wall_clock = upstream.wall_clock.max(started.elapsed().as_secs_f64());
    tokio::spawn(async move {
        let result = meter::meter(&upstream.body, &upstream.content_type, upstream.timings, wall_clock);
        let cost = crate::pricing::calculate_cost(&result.model, result.counts);

        let record = NewUsageRecord {
            api_key_id,
            endpoint: endpoint_for_meter,
            method: method_for_meter,
            model: result.model,
            input_tokens: result.counts.input as i64,
            output_tokens: result.counts.output as i64,
            cache_creation_tokens: result.counts.cache_creation as i64,
            cache_read_tokens: result.counts.cache_read as i64,
            cost,
            request_size,
            response_size,
            processing_time: wall_clock,
            output_tps: result.output_tps,
            status_code,
            error_message: if status_code >= 400 { Some(format!("upstream status {status_code}")) } else { None },
        };

        if let Err(e) = crate::ledger::insert(&pool, record).await {
            tracing::error!(error = %e, "failed to record usage; request served but unbilled");
        }
        if let Err(e) = crate::tenant_key::touch_last_used(&pool, api_key_id).await {
            tracing::error!(error = %e, "failed to update last_used_at");
        }
    });

    let mut builder = Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in &response_headers {
        builder = builder.header(name, value);
    }
    Ok(builder.body(axum::body::Body::from(response_body)).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
    }))
}
