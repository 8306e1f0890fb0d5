//! Tenant key store (C7)

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantKey {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_value: String,
    pub is_active: bool,
    pub rate_limit: i64,
    pub quota_limit: i64,
    pub cost_limit: f64,
    pub daily_quota: f64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub fn hash_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `ck-` followed by 32 URL-safe alphanumeric characters.
pub fn generate_key() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("ck-{suffix}")
}

#[derive(Debug, Default)]
pub struct NewTenantKey {
    pub name: String,
    pub rate_limit: Option<i64>,
    pub quota_limit: Option<i64>,
    pub cost_limit: Option<f64>,
    pub daily_quota: Option<f64>,
}

/// Create a TenantKey, returning the row and the plaintext (shown to the admin caller once).
pub async fn create(
    pool: &PgPool,
    new_key: NewTenantKey,
    default_rate_limit: i64,
    default_daily_quota: f64,
) -> Result<(TenantKey, String)> {
    let plaintext = generate_key();
    let key_hash = hash_key(&plaintext);

    let row = sqlx::query_as::<_, TenantKey>(
        r#"
        INSERT INTO tenant_keys (name, key_hash, key_value, rate_limit, quota_limit, cost_limit, daily_quota)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, name, key_hash, key_value, is_active, rate_limit, quota_limit, cost_limit, daily_quota, created_at, last_used_at
        "#,
    )
    .bind(&new_key.name)
    .bind(&key_hash)
    .bind(&plaintext)
    .bind(new_key.rate_limit.unwrap_or(default_rate_limit))
    .bind(new_key.quota_limit.unwrap_or(0))
    .bind(new_key.cost_limit.unwrap_or(10.0))
    .bind(new_key.daily_quota.unwrap_or(default_daily_quota))
    .fetch_one(pool)
    .await?;

    Ok((row, plaintext))
}

pub async fn list(pool: &PgPool) -> Result<Vec<TenantKey>> {
    let rows = sqlx::query_as::<_, TenantKey>(
        "SELECT id, name, key_hash, key_value, is_active, rate_limit, quota_limit, cost_limit, daily_quota, created_at, last_used_at \
         FROM tenant_keys ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<TenantKey>> {
    let row = sqlx::query_as::<_, TenantKey>(
        "SELECT id, name, key_hash, key_value, is_active, rate_limit, quota_limit, cost_limit, daily_quota, created_at, last_used_at \
         FROM tenant_keys WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Lookup used on the proxy hot path: active keys only.
pub async fn get_by_hash(pool: &PgPool, key_hash: &str) -> Result<Option<TenantKey>> {
    let row = sqlx::query_as::<_, TenantKey>(
        "SELECT id, name, key_hash, key_value, is_active, rate_limit, quota_limit, cost_limit, daily_quota, created_at, last_used_at \
         FROM tenant_keys WHERE key_hash = $1 AND is_active = TRUE",
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[derive(Debug, Default)]
pub struct TenantKeyUpdate {
    pub name: Option<String>,
    pub rate_limit: Option<i64>,
    pub quota_limit: Option<i64>,
    pub cost_limit: Option<f64>,
    pub daily_quota: Option<f64>,
}

pub async fn update(pool: &PgPool, id: Uuid, update: TenantKeyUpdate) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tenant_keys SET
            name = COALESCE($2, name),
            rate_limit = COALESCE($3, rate_limit),
            quota_limit = COALESCE($4, quota_limit),
            cost_limit = COALESCE($5, cost_limit),
            daily_quota = COALESCE($6, daily_quota)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(update.name)
    .bind(update.rate_limit)
    .bind(update.quota_limit)
    .bind(update.cost_limit)
    .bind(update.daily_quota)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE tenant_keys SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the key's ledger rows, then its daily-aggregate rows, then the key
/// itself, all in one transaction (foreign-key cascades also cover this, but the
/// explicit order mirrors the reference deletion sequence).
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM usage_records WHERE api_key_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM daily_usage WHERE api_key_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM tenant_keys WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Rotates the plaintext/hash, resets `created_at`, clears `last_used_at`.
pub async fn regenerate(pool: &PgPool, id: Uuid) -> Result<Option<(TenantKey, String)>> {
    let plaintext = generate_key();
    let key_hash = hash_key(&plaintext);

    let row = sqlx::query_as::<_, TenantKey>(
        r#"
        UPDATE tenant_keys
        SET key_hash = $2, key_value = $3, created_at = now(), last_used_at = NULL
        WHERE id = $1
        RETURNING id, name, key_hash, key_value, is_active, rate_limit, quota_limit, cost_limit, daily_quota, created_at, last_used_at
        "#,
    )
    .bind(id)
    .bind(&key_hash)
    .bind(&plaintext)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r, plaintext)))
}

pub async fn touch_last_used(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE tenant_keys SET last_used_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shape() {
        let key = generate_key();
        assert!(key.starts_with("ck-"));
        assert_eq!(key.len(), 35);
        assert!(key[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        let hash = hash_key("ck-abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_key("ck-abc"));
        assert_ne!(hash, hash_key("ck-abd"));
    }
}
