//! Backend registry (C6)
//!
//! Single-active, single-default invariants are enforced by compare-and-set
//! within a transaction rather than at the application layer.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackendConfig {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str =
    "id, name, base_url, api_key, is_active, is_default, created_at, updated_at";

fn trim_trailing_slash(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    base_url: &str,
    api_key: &str,
    is_default: bool,
) -> Result<BackendConfig> {
    let mut tx = pool.begin().await?;
    if is_default {
        sqlx::query("UPDATE backend_configs SET is_default = FALSE")
            .execute(&mut *tx)
            .await?;
    }
    let row = sqlx::query_as::<_, BackendConfig>(&format!(
        "INSERT INTO backend_configs (name, base_url, api_key, is_default) VALUES ($1, $2, $3, $4) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(name)
    .bind(trim_trailing_slash(base_url))
    .bind(api_key)
    .bind(is_default)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row)
}

pub async fn list(pool: &PgPool) -> Result<Vec<BackendConfig>> {
    let rows = sqlx::query_as::<_, BackendConfig>(&format!(
        "SELECT {SELECT_COLUMNS} FROM backend_configs ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns the active row; if none is active, the default row; if neither, `None`.
pub async fn get_active_or_default(pool: &PgPool) -> Result<Option<BackendConfig>> {
    if let Some(row) = sqlx::query_as::<_, BackendConfig>(&format!(
        "SELECT {SELECT_COLUMNS} FROM backend_configs WHERE is_active = TRUE LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?
    {
        return Ok(Some(row));
    }
    let row = sqlx::query_as::<_, BackendConfig>(&format!(
        "SELECT {SELECT_COLUMNS} FROM backend_configs WHERE is_default = TRUE LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Clears `is_active` on every row, then sets it on `id`, atomically.
pub async fn activate(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE backend_configs SET is_active = FALSE")
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("UPDATE backend_configs SET is_active = TRUE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Clears `is_default` on every row, then sets it on `id`, atomically.
pub async fn set_default(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE backend_configs SET is_default = FALSE")
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("UPDATE backend_configs SET is_default = TRUE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Default)]
pub struct BackendConfigUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

pub async fn update(pool: &PgPool, id: Uuid, update: BackendConfigUpdate) -> Result<bool> {
    let base_url = update.base_url.map(|u| trim_trailing_slash(&u));
    let result = sqlx::query(
        r#"
        UPDATE backend_configs SET
            name = COALESCE($2, name),
            base_url = COALESCE($3, base_url),
            api_key = COALESCE($4, api_key),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(update.name)
    .bind(base_url)
    .bind(update.api_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Rejects deletion of the default row.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
    let row = sqlx::query_as::<_, BackendConfig>(&format!(
        "SELECT {SELECT_COLUMNS} FROM backend_configs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        None => Ok(false),
        Some(row) if row.is_default => {
            Err(Error::Conflict("cannot delete the default backend".to_string()))
        }
        Some(_) => {
            let result = sqlx::query("DELETE FROM backend_configs WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

/// If no backend rows exist yet and an API key/base URL are configured, seed
/// exactly one active+default row so a fresh deployment can serve immediately.
pub async fn seed_default_if_empty(pool: &PgPool, base_url: &str, api_key: Option<&str>) -> Result<()> {
    let Some(api_key) = api_key else { return Ok(()) };

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backend_configs")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO backend_configs (name, base_url, api_key, is_active, is_default) \
         VALUES ('default', $1, $2, TRUE, TRUE)",
    )
    .bind(trim_trailing_slash(base_url))
    .bind(api_key)
    .execute(pool)
    .await?;
    Ok(())
}
