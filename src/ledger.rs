//! Usage ledger (C4)
//!
//! Strictly append-only. Writes happen off the request hot path, inside the
//! metering background task.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct NewUsageRecord {
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub cost: f64,
    pub request_size: i64,
    pub response_size: i64,
    pub processing_time: f64,
    pub output_tps: f64,
    pub status_code: i32,
    pub error_message: Option<String>,
}

impl NewUsageRecord {
    pub fn tokens_used(&self) -> i64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

pub async fn insert(pool: &PgPool, record: NewUsageRecord) -> Result<()> {
    let tokens_used = record.tokens_used();
    sqlx::query(
        r#"
        INSERT INTO usage_records (
            api_key_id, endpoint, method, model,
            input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens, tokens_used,
            cost, request_size, response_size, processing_time, output_tps,
            status_code, error_message
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(record.api_key_id)
    .bind(record.endpoint)
    .bind(record.method)
    .bind(record.model)
    .bind(record.input_tokens)
    .bind(record.output_tokens)
    .bind(record.cache_creation_tokens)
    .bind(record.cache_read_tokens)
    .bind(tokens_used)
    .bind(record.cost)
    .bind(record.request_size)
    .bind(record.response_size)
    .bind(record.processing_time)
    .bind(record.output_tps)
    .bind(record.status_code)
    .bind(record.error_message)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UsageRecordRow {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub tokens_used: i64,
    pub cost: f64,
    pub request_size: i64,
    pub response_size: i64,
    pub processing_time: f64,
    pub output_tps: f64,
    pub timestamp: DateTime<Utc>,
    pub status_code: i32,
    pub error_message: Option<String>,
}

pub async fn list_recent(pool: &PgPool, api_key_id: Uuid, limit: i64) -> Result<Vec<UsageRecordRow>> {
    let rows = sqlx::query_as::<_, UsageRecordRow>(
        "SELECT * FROM usage_records WHERE api_key_id = $1 ORDER BY timestamp DESC LIMIT $2",
    )
    .bind(api_key_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub avg_processing_time: f64,
    pub avg_output_tps: f64,
    pub requests_today: i64,
    pub tokens_today: i64,
}

pub async fn stats_for_key(pool: &PgPool, api_key_id: Uuid) -> Result<UsageStats> {
    let all: (Option<i64>, Option<i64>, Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
        "SELECT COUNT(*), SUM(tokens_used), SUM(cost), AVG(processing_time), AVG(output_tps) \
         FROM usage_records WHERE api_key_id = $1",
    )
    .bind(api_key_id)
    .fetch_one(pool)
    .await?;

    let today: (Option<i64>, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), SUM(tokens_used) FROM usage_records \
         WHERE api_key_id = $1 AND timestamp::date = CURRENT_DATE",
    )
    .bind(api_key_id)
    .fetch_one(pool)
    .await?;

    Ok(UsageStats {
        total_requests: all.0.unwrap_or(0),
        total_tokens: all.1.unwrap_or(0),
        total_cost: all.2.unwrap_or(0.0),
        avg_processing_time: all.3.unwrap_or(0.0),
        avg_output_tps: all.4.unwrap_or(0.0),
        requests_today: today.0.unwrap_or(0),
        tokens_today: today.1.unwrap_or(0),
    })
}

#[derive(Debug, Clone, Default)]
pub struct GlobalUsageSummary {
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub active_keys: i64,
}

pub async fn global_summary(pool: &PgPool) -> Result<GlobalUsageSummary> {
    let row: (Option<i64>, Option<i64>, Option<f64>, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), SUM(tokens_used), SUM(cost), COUNT(DISTINCT api_key_id) FROM usage_records",
    )
    .fetch_one(pool)
    .await?;
    Ok(GlobalUsageSummary {
        total_requests: row.0.unwrap_or(0),
        total_tokens: row.1.unwrap_or(0),
        total_cost: row.2.unwrap_or(0.0),
        active_keys: row.3.unwrap_or(0),
    })
}

#[derive(Debug, Clone)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
}

/// Per-day totals for one key across `[start, end]`, queried live from the
/// ledger (not from the `daily_usage` roll-up), zero-filled by the caller.
pub async fn chart_data_for_key(
    pool: &PgPool,
    api_key_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DayTotals>> {
    let rows: Vec<(NaiveDate, Option<i64>, Option<i64>, Option<f64>)> = sqlx::query_as(
        r#"
        SELECT timestamp::date AS day, COUNT(*), SUM(tokens_used), SUM(cost)
        FROM usage_records
        WHERE api_key_id = $1 AND timestamp::date BETWEEN $2 AND $3
        GROUP BY day
        "#,
    )
    .bind(api_key_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(date, requests, tokens, cost)| DayTotals {
            date,
            total_requests: requests.unwrap_or(0),
            total_tokens: tokens.unwrap_or(0),
            total_cost: cost.unwrap_or(0.0),
        })
        .collect())
}

/// Global per-day totals across all keys for `[start, end]`.
pub async fn chart_data_global(pool: &PgPool, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayTotals>> {
    let rows: Vec<(NaiveDate, Option<i64>, Option<i64>, Option<f64>)> = sqlx::query_as(
        r#"
        SELECT timestamp::date AS day, COUNT(*), SUM(tokens_used), SUM(cost)
        FROM usage_records
        WHERE timestamp::date BETWEEN $1 AND $2
        GROUP BY day
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(date, requests, tokens, cost)| DayTotals {
            date,
            total_requests: requests.unwrap_or(0),
            total_tokens: tokens.unwrap_or(0),
            total_cost: cost.unwrap_or(0.0),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_used_sums_all_four_classes() {
        let record = NewUsageRecord {
            input_tokens: 100,
            output_tokens: 250,
            cache_creation_tokens: 0,
            cache_read_tokens: 50,
            ..Default::default()
        };
        assert_eq!(record.tokens_used(), 400);
    }
}
