//! Configuration for the proxy
//!
//! All secrets are injected via environment variables at runtime.
//! The source code contains no secrets.

use anyhow::{Context, Result};
use std::collections::HashMap;

#[derive(Clone)]
pub struct Config {
    /// API key used when seeding the initial default backend on first startup.
    pub anthropic_api_key: Option<String>,
    /// Base URL used when seeding the initial default backend on first startup.
    pub anthropic_base_url: String,

    pub database_url: String,
    pub db_max_connections: u32,

    /// Signs admin bearer tokens.
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,

    pub admin_username: String,
    pub admin_password: String,

    pub server_host: String,
    pub server_port: u16,

    /// Default `rate_limit` (requests/hour) applied to a TenantKey created without one.
    pub default_rate_limit: i64,
    /// Default `daily_quota` (USD/day) applied to a TenantKey created without one.
    pub default_quota_limit: i64,

    /// Initial value of the model-swap feature flag; mutable at runtime via the admin API.
    pub enable_model_swapping: bool,
    /// Initial model-name mapping; mutable at runtime via the admin API.
    pub model_mapping: HashMap<String, String>,

    /// Hard timeout on any single upstream request, per the concurrency model.
    pub http_client_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),

            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DB_MAX_CONNECTIONS")?,

            secret_key: std::env::var("SECRET_KEY").context("SECRET_KEY is required")?,
            algorithm: std::env::var("ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            access_token_expire_minutes: std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "10080".to_string())
                .parse()
                .context("Invalid ACCESS_TOKEN_EXPIRE_MINUTES")?,

            admin_username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: std::env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD is required")?,

            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,

            default_rate_limit: std::env::var("DEFAULT_RATE_LIMIT")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid DEFAULT_RATE_LIMIT")?,
            default_quota_limit: std::env::var("DEFAULT_QUOTA_LIMIT")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()
                .context("Invalid DEFAULT_QUOTA_LIMIT")?,

            enable_model_swapping: std::env::var("ENABLE_MODEL_SWAPPING")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid ENABLE_MODEL_SWAPPING")?,
            model_mapping: match std::env::var("MODEL_MAPPING") {
                Ok(raw) if !raw.trim().is_empty() => {
                    serde_json::from_str(&raw).context("Invalid MODEL_MAPPING (must be a JSON object)")?
                }
                _ => HashMap::new(),
            },

            http_client_timeout_secs: std::env::var("HTTP_CLIENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid HTTP_CLIENT_TIMEOUT_SECS")?,
        })
    }
}
