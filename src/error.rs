//! Error types for the proxy

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Crate-wide error type. Every fallible operation in C1-C10/C14 returns this;
/// it is converted to an HTTP response exactly once, at the axum boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// No `Authorization`/`x-api-key` header present.
    #[error("API key required")]
    AuthMissing,

    /// Header present but no active TenantKey matches its hash.
    #[error("Invalid API key")]
    AuthInvalid,

    /// One of the three admission checks rejected the request.
    #[error("{kind} limit exceeded")]
    LimitExceeded {
        kind: LimitKind,
        headers: Vec<(String, String)>,
    },

    /// No active-or-default BackendConfig row exists.
    #[error("No backend configuration available")]
    NoBackend,

    /// Upstream did not respond within the configured hard timeout.
    #[error("Upstream request timed out")]
    UpstreamTimeout,

    /// Upstream connection failed outright.
    #[error("Upstream network error: {0}")]
    UpstreamNetwork(String),

    /// Upstream returned 200 with a zero-length body.
    #[error("Empty response from upstream API")]
    UpstreamEmptyBody,

    /// Admin resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Admin bearer token missing/invalid/expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Admin operation conflicts with an invariant (e.g. deleting the default backend).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration failed to load or validate.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Rate,
    Cost,
    DailyQuota,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Rate => write!(f, "rate"),
            LimitKind::Cost => write!(f, "cost"),
            LimitKind::DailyQuota => write!(f, "daily quota"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body, extra_headers): (StatusCode, serde_json::Value, Vec<(String, String)>) =
            match self {
                Error::AuthMissing => (
                    StatusCode::UNAUTHORIZED,
                    json!({"error": {"message": "API key required", "type": "authentication_error"}}),
                    vec![],
                ),
                Error::AuthInvalid => (
                    StatusCode::UNAUTHORIZED,
                    json!({"error": {"message": "Invalid API key", "type": "authentication_error"}}),
                    vec![],
                ),
                Error::LimitExceeded { kind, headers } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    json!({"error": {"message": format!("{kind} limit exceeded"), "type": "rate_limit_error"}}),
                    headers,
                ),
                Error::NoBackend => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({"error": {"message": "No backend configuration available", "type": "proxy_error"}}),
                    vec![],
                ),
                Error::UpstreamTimeout => (
                    StatusCode::GATEWAY_TIMEOUT,
                    json!({"error": {"message": "Upstream request timed out", "type": "proxy_error"}}),
                    vec![],
                ),
                Error::UpstreamNetwork(msg) => (
                    StatusCode::BAD_GATEWAY,
                    json!({"error": {"message": msg, "type": "proxy_error"}}),
                    vec![],
                ),
                Error::UpstreamEmptyBody => (
                    StatusCode::BAD_GATEWAY,
                    json!({"error": {"message": "Empty response from upstream API", "type": "proxy_error"}}),
                    vec![],
                ),
                Error::NotFound(msg) => (
                    StatusCode::NOT_FOUND,
                    json!({"error": {"message": msg, "type": "not_found"}}),
                    vec![],
                ),
                Error::Unauthorized(msg) => (
                    StatusCode::UNAUTHORIZED,
                    json!({"error": {"message": msg, "type": "authentication_error"}}),
                    vec![],
                ),
                Error::Conflict(msg) => (
                    StatusCode::CONFLICT,
                    json!({"error": {"message": msg, "type": "conflict"}}),
                    vec![],
                ),
                Error::Configuration(msg) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": {"message": msg, "type": "configuration_error"}}),
                    vec![],
                ),
                Error::Sql(e) => {
                    tracing::error!(error = %e, "database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"error": {"message": "Internal server error", "type": "internal_error"}}),
                        vec![],
                    )
                }
                Error::Reqwest(e) => {
                    tracing::error!(error = %e, "upstream http client error");
                    (
                        StatusCode::BAD_GATEWAY,
                        json!({"error": {"message": "Upstream request failed", "type": "proxy_error"}}),
                        vec![],
                    )
                }
                Error::Serialization(e) => {
                    tracing::error!(error = %e, "serialization error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"error": {"message": "Internal server error", "type": "internal_error"}}),
                        vec![],
                    )
                }
                Error::Io(e) => {
                    tracing::error!(error = %e, "io error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"error": {"message": "Internal server error", "type": "internal_error"}}),
                        vec![],
                    )
                }
                Error::Other(msg) => {
                    tracing::error!(error = %msg, "proxy error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"error": {"message": "Proxy error", "type": "internal_error"}}),
                        vec![],
                    )
                }
            };

        let mut response = (status, Json(body)).into_response();
        for (name, value) in extra_headers {
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::from_bytes(name.as_bytes()),
                axum::http::HeaderValue::from_str(&value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}
