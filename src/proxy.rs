//! Upstream request builder and response relay (C8, steps 3-7)
//!
//! The handler in `routes::proxy` owns steps 1-2 (auth, admission) and 8
//! (background metering); this module owns building the upstream request and
//! consuming its response.

use std::time::Instant;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;

use crate::backend::BackendConfig;
use crate::error::{Error, Result};
use crate::meter::TokenTimings;

const STRIPPED_REQUEST_HEADERS: &[&str] = &["host", "authorization", "x-api-key"];
const STRIPPED_RESPONSE_HEADERS: &[&str] = &["content-length", "transfer-encoding"];

/// Copies `client_headers` onto a new map, dropping hop-by-hop and credential
/// headers, then stamps in the backend's own credential and a default
/// `anthropic-version` when the client didn't send one.
pub fn build_upstream_headers(client_headers: &HeaderMap, backend: &BackendConfig, client_used_bearer: bool) -> HeaderMap {
    let mut upstream = HeaderMap::new();
    for (name, value) in client_headers {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        upstream.insert(name.clone(), value.clone());
    }

    if client_used_bearer {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", backend.api_key)) {
            upstream.insert(axum::http::header::AUTHORIZATION, value);
        }
    } else if let Ok(value) = HeaderValue::from_str(&backend.api_key) {
        upstream.insert(HeaderName::from_static("x-api-key"), value);
    }

    if !upstream.contains_key("anthropic-version") {
        upstream.insert(HeaderName::from_static("anthropic-version"), HeaderValue::from_static("2023-06-01"));
    }

    upstream
}

pub fn upstream_url(backend: &BackendConfig, endpoint: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/v1/{}", backend.base_url, endpoint.trim_start_matches('/'));
    if let Some(query) = query {
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
    }
    url
}

pub struct UpstreamResponse {
    pub status: axum::http::StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content_type: String,
    pub timings: TokenTimings,
    pub wall_clock: f64,
}

/// Sends the request and consumes the response in one of two modes
/// (SSE chunk-watching vs plain buffering), always fully buffering before
/// returning — the pipeline never streams bytes to the client incrementally.
pub async fn relay(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<UpstreamResponse> {
    let start = Instant::now();
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| Error::Other(format!("invalid method: {e}")))?;

    let response = client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout
            } else {
                Error::UpstreamNetwork(e.to_string())
            }
        })?;

    let status = response.status();
    let mut response_headers = HeaderMap::new();
    for (name, value) in response.headers() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response_headers.insert(name.clone(), value.clone());
    }
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut timings = TokenTimings::default();
    let body = if content_type.starts_with("text/event-stream") {
        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::UpstreamNetwork(e.to_string()))?;
            timings.observe_chunk(&String::from_utf8_lossy(&chunk));
            buffer.extend_from_slice(&chunk);
        }
        Bytes::from(buffer)
    } else {
        response.bytes().await.map_err(|e| Error::UpstreamNetwork(e.to_string()))?
    };

    let wall_clock = start.elapsed().as_secs_f64();

    if status == axum::http::StatusCode::OK && body.is_empty() {
        return Err(Error::UpstreamEmptyBody);
    }

    Ok(UpstreamResponse { status, headers: response_headers, body, content_type, timings, wall_clock })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendConfig {
        BackendConfig {
            id: uuid::Uuid::nil(),
            name: "default".into(),
            base_url: "https://api.anthropic.com".into(),
            api_key: "sk-ant-test".into(),
            is_active: true,
            is_default: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn upstream_url_joins_endpoint_and_query() {
        let url = upstream_url(&backend(), "messages", Some("beta=true"));
        assert_eq!(url, "https://api.anthropic.com/v1/messages?beta=true");
    }

    #[test]
    fn upstream_url_without_query_has_no_trailing_marker() {
        let url = upstream_url(&backend(), "messages", None);
        assert_eq!(url, "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn bearer_client_gets_bearer_upstream_credential() {
        let headers = HeaderMap::new();
        let upstream = build_upstream_headers(&headers, &backend(), true);
        assert_eq!(upstream.get(axum::http::header::AUTHORIZATION).unwrap(), "Bearer sk-ant-test");
        assert!(!upstream.contains_key("x-api-key"));
    }

    #[test]
    fn x_api_key_client_gets_x_api_key_upstream_credential() {
        let headers = HeaderMap::new();
        let upstream = build_upstream_headers(&headers, &backend(), false);
        assert_eq!(upstream.get("x-api-key").unwrap(), "sk-ant-test");
        assert!(!upstream.contains_key(axum::http::header::AUTHORIZATION));
    }

    #[test]
    fn missing_anthropic_version_gets_default() {
        let headers = HeaderMap::new();
        let upstream = build_upstream_headers(&headers, &backend(), true);
        assert_eq!(upstream.get("anthropic-version").unwrap(), "2023-06-01");
    }

    #[test]
    fn existing_anthropic_version_is_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("anthropic-version"), HeaderValue::from_static("2024-01-01"));
        let upstream = build_upstream_headers(&headers, &backend(), true);
        assert_eq!(upstream.get("anthropic-version").unwrap(), "2024-01-01");
    }
}
