//! /usage/* - global and per-key usage reporting, and the aggregator trigger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AdminAuth};
use crate::error::Result;
use crate::ledger::{self, DayTotals};
use crate::{aggregator, tenant_key};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    days: Option<u32>,
}

fn clamp_days(days: Option<u32>) -> i64 {
    days.unwrap_or(30).clamp(1, 365) as i64
}

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
}

/// Zero-fills every date in `[start, end]` missing from `rows`.
fn zero_fill(rows: Vec<DayTotals>, start: NaiveDate, end: NaiveDate) -> Vec<ChartPoint> {
    let by_date: std::collections::HashMap<NaiveDate, DayTotals> = rows.into_iter().map(|r| (r.date, r)).collect();
    let mut points = Vec::new();
    let mut day = start;
    while day <= end {
        let point = by_date
            .get(&day)
            .cloned()
            .unwrap_or(DayTotals { date: day, total_requests: 0, total_tokens: 0, total_cost: 0.0 });
        points.push(ChartPoint {
            date: point.date,
            total_requests: point.total_requests,
            total_tokens: point.total_tokens,
            total_cost: point.total_cost,
        });
        day += Duration::days(1);
    }
    points
}

pub async fn summary(_admin: AdminAuth, State(state): State<Arc<AppState>>) -> Result<Json<ledger::GlobalUsageSummary>> {
    Ok(Json(ledger::global_summary(&state.db).await?))
}

pub async fn chart_global(_admin: AdminAuth, State(state): State<Arc<AppState>>, Query(q): Query<DaysQuery>) -> Result<Json<Vec<ChartPoint>>> {
    let days = clamp_days(q.days);
    let end = Utc::now().date_naive();
    let start = end - Duration::days(days - 1);
    let rows = ledger::chart_data_global(&state.db, start, end).await?;
    Ok(Json(zero_fill(rows, start, end)))
}

pub async fn stats(_admin: AdminAuth, State(state): State<Arc<AppState>>, Path(key_id): Path<String>) -> Result<Json<ledger::UsageStats>> {
    let key_id = auth::parse_id(&key_id)?;
    tenant_key::get_by_id(&state.db, key_id)
        .await?
        .ok_or_else(|| crate::error::Error::NotFound(format!("tenant key {key_id} not found")))?;
    Ok(Json(ledger::stats_for_key(&state.db, key_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<i64>,
}

pub async fn records(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ledger::UsageRecordRow>>> {
    let key_id = auth::parse_id(&key_id)?;
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(ledger::list_recent(&state.db, key_id, limit).await?))
}

pub async fn chart_for_key(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Vec<ChartPoint>>> {
    let key_id = auth::parse_id(&key_id)?;
    let days = clamp_days(q.days);
    let end = Utc::now().date_naive();
    let start = end - Duration::days(days - 1);
    let rows = ledger::chart_data_for_key(&state.db, key_id, start, end).await?;
    Ok(Json(zero_fill(rows, start, end)))
}

#[derive(Debug, Deserialize)]
pub struct AggregateQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub date: NaiveDate,
    pub groups_written: usize,
}

pub async fn aggregate(_admin: AdminAuth, State(state): State<Arc<AppState>>, Query(q): Query<AggregateQuery>) -> Result<Json<AggregateResponse>> {
    let date = match q.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| crate::error::Error::Other(format!("invalid date: {raw}")))?,
        None => aggregator::yesterday(),
    };
    let groups_written = aggregator::aggregate(&state.db, date).await?;
    Ok(Json(AggregateResponse { date, groups_written }))
}
