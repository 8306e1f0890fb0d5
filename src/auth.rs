//! Authentication extractors (C7, admin surface)
//!
//! Two independent schemes share this module:
//! - Tenant key auth: `Authorization: Bearer <key>` or `x-api-key: <key>` on the
//!   proxy surface, resolved against the hashed `tenant_keys` table.
//! - Admin auth: a signed JWT bearer token on the `/admin`/`/usage` surface,
//!   issued by the login endpoint against `ADMIN_USERNAME`/`ADMIN_PASSWORD`.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::tenant_key::{self, TenantKey};
use crate::AppState;

fn extract_bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// A request carrying a valid, active tenant key. Extracting this also
/// touches `last_used_at` is left to the caller (the proxy handler), since
/// the extractor itself should not perform a write on every request path
/// that merely wants to read the key.
#[derive(Debug, Clone)]
pub struct TenantAuth(pub TenantKey);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for TenantAuth {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let presented = extract_bearer(parts).or_else(|| {
            parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });
        let Some(presented) = presented else { return Err(Error::AuthMissing) };

        let key_hash = tenant_key::hash_key(&presented);
        let key = tenant_key::get_by_hash(&state.db, &key_hash)
            .await?
            .ok_or(Error::AuthInvalid)?;

        Ok(TenantAuth(key))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Mints a bearer token for the admin API, valid for `access_token_expire_minutes`.
pub fn issue_admin_token(config: &crate::config::Config) -> Result<String, Error> {
    let claims = Claims {
        sub: config.admin_username.clone(),
        exp: (Utc::now() + Duration::minutes(config.access_token_expire_minutes)).timestamp(),
    };
    let header = Header::new(algorithm_from_name(&config.algorithm));
    encode(&header, &claims, &EncodingKey::from_secret(config.secret_key.as_bytes()))
        .map_err(|e| Error::Other(format!("failed to sign admin token: {e}")))
}

fn algorithm_from_name(name: &str) -> jsonwebtoken::Algorithm {
    match name {
        "HS384" => jsonwebtoken::Algorithm::HS384,
        "HS512" => jsonwebtoken::Algorithm::HS512,
        _ => jsonwebtoken::Algorithm::HS256,
    }
}

/// A request carrying a valid admin bearer token.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub username: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts).ok_or_else(|| Error::Unauthorized("missing bearer token".into()))?;

        let mut validation = Validation::new(algorithm_from_name(&state.config.algorithm));
        validation.validate_exp = true;
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(state.config.secret_key.as_bytes()),
            &validation,
        )
        .map_err(|e| Error::Unauthorized(format!("invalid or expired token: {e}")))?;

        Ok(AdminAuth { username: data.claims.sub })
    }
}

/// Verifies the admin username/password pair against configuration. Plain
/// equality is adequate here: both sides originate from trusted environment
/// variables, not from a stored, attacker-reachable hash.
pub fn verify_admin_credentials(config: &crate::config::Config, username: &str, password: &str) -> bool {
    constant_time_eq(username.as_bytes(), config.admin_username.as_bytes())
        && constant_time_eq(password.as_bytes(), config.admin_password.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Parses a tenant key id out of an admin path segment.
pub fn parse_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::NotFound(format!("invalid id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"short", b"longer_value"));
    }

    #[test]
    fn constant_time_eq_accepts_equal_bytes() {
        assert!(constant_time_eq(b"admin", b"admin"));
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
    }
}
