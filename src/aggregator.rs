//! Daily aggregator (C10)
//!
//! Offline roll-up of the ledger into per-day, per-key, per-model summaries.
//! Invoked on demand (via the admin API) or on a schedule.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LedgerRow {
    api_key_id: Uuid,
    model: String,
    input_tokens: i64,
    output_tokens: i64,
    cache_creation_tokens: i64,
    cache_read_tokens: i64,
    tokens_used: i64,
    cost: f64,
    processing_time: f64,
    output_tps: f64,
}

#[derive(Debug, Default)]
struct Accumulator {
    total_requests: i64,
    total_input_tokens: i64,
    total_output_tokens: i64,
    total_cache_creation_tokens: i64,
    total_cache_read_tokens: i64,
    total_tokens: i64,
    total_cost: f64,
    processing_times: Vec<f64>,
    output_tps_values: Vec<f64>,
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Groups ledger rows for `date` by `(api_key_id, model)`, sums counters,
/// averages only non-zero `processing_time`/`output_tps` samples, and upserts
/// into `daily_usage`. Returns the number of (key, model) groups written.
pub async fn aggregate(pool: &PgPool, date: NaiveDate) -> Result<usize> {
    let rows: Vec<LedgerRow> = sqlx::query_as(
        r#"
        SELECT api_key_id, model, input_tokens, output_tokens, cache_creation_tokens,
               cache_read_tokens, tokens_used, cost, processing_time, output_tps
        FROM usage_records
        WHERE timestamp::date = $1
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    let mut groups: std::collections::HashMap<(Uuid, String), Accumulator> = std::collections::HashMap::new();
    for row in rows {
        let entry = groups.entry((row.api_key_id, row.model.clone())).or_default();
        entry.total_requests += 1;
        entry.total_input_tokens += row.input_tokens;
        entry.total_output_tokens += row.output_tokens;
        entry.total_cache_creation_tokens += row.cache_creation_tokens;
        entry.total_cache_read_tokens += row.cache_read_tokens;
        entry.total_tokens += row.tokens_used;
        entry.total_cost += row.cost;
        if row.processing_time > 0.0 {
            entry.processing_times.push(row.processing_time);
        }
        if row.output_tps > 0.0 {
            entry.output_tps_values.push(row.output_tps);
        }
    }

    let group_count = groups.len();
    for ((api_key_id, model), acc) in groups {
        let avg_processing_time = average(&acc.processing_times);
        let avg_output_tps = average(&acc.output_tps_values);

        sqlx::query(
            r#"
            INSERT INTO daily_usage (
                api_key_id, date, model, total_requests, total_input_tokens, total_output_tokens,
                total_cache_creation_tokens, total_cache_read_tokens, total_tokens, total_cost,
                avg_processing_time, avg_output_tps
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (api_key_id, date, model) DO UPDATE SET
                total_requests = EXCLUDED.total_requests,
                total_input_tokens = EXCLUDED.total_input_tokens,
                total_output_tokens = EXCLUDED.total_output_tokens,
                total_cache_creation_tokens = EXCLUDED.total_cache_creation_tokens,
                total_cache_read_tokens = EXCLUDED.total_cache_read_tokens,
                total_tokens = EXCLUDED.total_tokens,
                total_cost = EXCLUDED.total_cost,
                avg_processing_time = EXCLUDED.avg_processing_time,
                avg_output_tps = EXCLUDED.avg_output_tps
            "#,
        )
        .bind(api_key_id)
        .bind(date)
        .bind(&model)
        .bind(acc.total_requests)
        .bind(acc.total_input_tokens)
        .bind(acc.total_output_tokens)
        .bind(acc.total_cache_creation_tokens)
        .bind(acc.total_cache_read_tokens)
        .bind(acc.total_tokens)
        .bind(acc.total_cost)
        .bind(avg_processing_time)
        .bind(avg_output_tps)
        .execute(pool)
        .await?;
    }

    Ok(group_count)
}

/// Yesterday UTC, the default date when none is supplied.
pub fn yesterday() -> NaiveDate {
    (Utc::now() - Duration::days(1)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_empty_slice_is_zero() {
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn average_ignores_nothing_once_filtered_by_caller() {
        assert_eq!(average(&[2.0, 4.0]), 3.0);
    }
}
