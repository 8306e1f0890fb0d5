//! Limit engine (C5)
//!
//! Three independent checks over the usage ledger, sharing the same read-then-decide
//! shape: a `limit <= 0` means unlimited; otherwise the check sums ledger rows over
//! its window and rejects once the sum would meet or exceed the limit.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, LimitKind, Result};

#[derive(Debug, Clone)]
pub struct LimitInfo {
    pub limit: f64,
    pub current_usage: f64,
    pub remaining: f64,
    pub reset_time: DateTime<Utc>,
    pub unlimited: bool,
}

impl LimitInfo {
    fn unlimited() -> Self {
        Self {
            limit: 0.0,
            current_usage: 0.0,
            remaining: 0.0,
            reset_time: Utc::now(),
            unlimited: true,
        }
    }
}

async fn requests_since(pool: &PgPool, api_key_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM usage_records WHERE api_key_id = $1 AND timestamp >= $2",
    )
    .bind(api_key_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn cost_since(pool: &PgPool, api_key_id: Uuid, since: DateTime<Utc>) -> Result<f64> {
    let row: (Option<f64>,) = sqlx::query_as(
        "SELECT SUM(cost) FROM usage_records WHERE api_key_id = $1 AND timestamp >= $2",
    )
    .bind(api_key_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0.unwrap_or(0.0))
}

/// Reject when `count(*)` over the trailing hour reaches `rate_limit`.
pub async fn check_rate_limit(pool: &PgPool, api_key_id: Uuid, rate_limit: i64) -> Result<(bool, LimitInfo)> {
    if rate_limit <= 0 {
        return Ok((true, LimitInfo::unlimited()));
    }
    let window_start = Utc::now() - Duration::hours(1);
    let current = requests_since(pool, api_key_id, window_start).await?;
    let allowed = current < rate_limit;
    let info = LimitInfo {
        limit: rate_limit as f64,
        current_usage: current as f64,
        remaining: (rate_limit - current).max(0) as f64,
        reset_time: Utc::now() + Duration::hours(1),
        unlimited: false,
    };
    Ok((allowed, info))
}

/// Reject when `sum(cost)` over the trailing hour reaches `cost_limit`.
pub async fn check_cost_limit(pool: &PgPool, api_key_id: Uuid, cost_limit: f64) -> Result<(bool, LimitInfo)> {
    if cost_limit <= 0.0 {
        return Ok((true, LimitInfo::unlimited()));
    }
    let window_start = Utc::now() - Duration::hours(1);
    let current = cost_since(pool, api_key_id, window_start).await?;
    let allowed = current < cost_limit;
    let info = LimitInfo {
        limit: cost_limit,
        current_usage: current,
        remaining: (cost_limit - current).max(0.0),
        reset_time: Utc::now() + Duration::hours(1),
        unlimited: false,
    };
    Ok((allowed, info))
}

/// Reject when `sum(cost)` since today 00:00 UTC reaches `daily_quota`.
pub async fn check_daily_quota(pool: &PgPool, api_key_id: Uuid, daily_quota: f64) -> Result<(bool, LimitInfo)> {
    if daily_quota <= 0.0 {
        return Ok((true, LimitInfo::unlimited()));
    }
    let today_start = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc();
    let current = cost_since(pool, api_key_id, today_start).await?;
    let allowed = current < daily_quota;
    let info = LimitInfo {
        limit: daily_quota,
        current_usage: current,
        remaining: (daily_quota - current).max(0.0),
        reset_time: today_start + Duration::days(1),
        unlimited: false,
    };
    Ok((allowed, info))
}

fn headers_for(prefix: &str, info: &LimitInfo, retry_after: &'static str) -> Vec<(String, String)> {
    vec![
        (format!("X-{prefix}-Limit"), info.limit.to_string()),
        (format!("X-{prefix}-Remaining"), info.remaining.to_string()),
        (format!("X-{prefix}-Reset"), info.reset_time.to_rfc3339()),
        ("Retry-After".to_string(), retry_after.to_string()),
    ]
}

/// Run the three checks in order; the first rejection short-circuits.
pub async fn check_all(
    pool: &PgPool,
    api_key_id: Uuid,
    rate_limit: i64,
    cost_limit: f64,
    daily_quota: f64,
) -> Result<()> {
    let (allowed, info) = check_rate_limit(pool, api_key_id, rate_limit).await?;
    if !allowed {
        return Err(Error::LimitExceeded {
            kind: LimitKind::Rate,
            headers: headers_for("RateLimit", &info, "3600"),
        });
    }

    let (allowed, info) = check_cost_limit(pool, api_key_id, cost_limit).await?;
    if !allowed {
        return Err(Error::LimitExceeded {
            kind: LimitKind::Cost,
            headers: headers_for("CostLimit", &info, "3600"),
        });
    }

    let (allowed, info) = check_daily_quota(pool, api_key_id, daily_quota).await?;
    if !allowed {
        return Err(Error::LimitExceeded {
            kind: LimitKind::DailyQuota,
            headers: headers_for("DailyQuota", &info, "86400"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_is_treated_as_unlimited_without_a_query() {
        let info = LimitInfo::unlimited();
        assert!(info.unlimited);
        assert_eq!(info.remaining, 0.0);
    }
}
