//! SSE meter (C9)
//!
//! Parses the buffered upstream response (SSE or batch JSON) to extract the
//! model, four token counts, and first/last token timestamps. Any parse
//! failure degrades gracefully to zeroed counters and `model = "unknown"`.

use std::time::Instant;

use serde_json::Value;

use crate::pricing::TokenCounts;

#[derive(Debug, Clone)]
pub struct MeterResult {
    pub model: String,
    pub counts: TokenCounts,
    pub generation_time: f64,
    pub output_tps: f64,
}

/// Timing markers captured while streaming the upstream response.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTimings {
    pub first_token: Option<Instant>,
    pub last_token: Option<Instant>,
}

impl TokenTimings {
    /// Call once per streamed chunk of a `text/event-stream` response.
    pub fn observe_chunk(&mut self, chunk: &str) {
        if chunk.contains("content_block_delta") {
            if self.first_token.is_none() {
                self.first_token = Some(Instant::now());
            }
            self.last_token = Some(Instant::now());
        } else if chunk.contains("message_delta") {
            self.last_token = Some(Instant::now());
        }
    }
}

fn usage_from_value(usage: &Value) -> TokenCounts {
    TokenCounts {
        input: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        cache_creation: usage
            .get("cache_creation_input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        cache_read: usage
            .get("cache_read_input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

fn parse_sse(body: &str) -> (String, TokenCounts) {
    let mut model = "unknown".to_string();
    let mut counts = TokenCounts::default();

    for line in body.split('\n') {
        let Some(rest) = line.strip_prefix("data: ") else { continue };
        let rest = rest.trim();
        if rest.is_empty() || rest == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(rest) else { continue };
        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                let message = event.get("message").cloned().unwrap_or(Value::Null);
                if let Some(m) = message.get("model").and_then(Value::as_str) {
                    model = m.to_string();
                }
                if let Some(usage) = message.get("usage") {
                    counts = usage_from_value(usage);
                }
            }
            // output_tokens carries the running total; replace, not add.
            Some("message_delta") => {
                if let Some(output) = event
                    .get("delta")
                    .and_then(|d| d.get("usage"))
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(Value::as_u64)
                {
                    counts.output = output;
                }
            }
            Some("content_block_delta") | Some("content_block_start") | Some("message") => {
                if model == "unknown" {
                    if let Some(m) = event.get("model").and_then(Value::as_str) {
                        model = m.to_string();
                    }
                }
            }
            _ => {}
        }
    }

    (model, counts)
}

fn parse_json_body(body: &[u8]) -> (String, TokenCounts) {
    let Ok(root) = serde_json::from_slice::<Value>(body) else {
        return ("unknown".to_string(), TokenCounts::default());
    };
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let counts = root.get("usage").map(usage_from_value).unwrap_or_default();
    (model, counts)
}

/// `wall_clock` is the total request processing time, used when no reliable
/// first/last token timing exists.
pub fn meter(body: &[u8], content_type: &str, timings: TokenTimings, wall_clock: f64) -> MeterResult {
    let (model, counts) = if content_type.starts_with("text/event-stream") {
        let text = String::from_utf8_lossy(body);
        parse_sse(&text)
    } else {
        parse_json_body(body)
    };

    let generation_time = match (timings.first_token, timings.last_token) {
        (Some(first), Some(last)) if counts.output > 0 => last.duration_since(first).as_secs_f64(),
        _ => wall_clock,
    };

    let output_tps = if counts.output > 0 && generation_time > 0.0 {
        counts.output as f64 / generation_time
    } else {
        0.0
    };

    MeterResult { model, counts, generation_time, output_tps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_delta_replaces_output_tokens_not_increments() {
        let body = concat!(
            "data: {\"type\":\"message_start\",\"message\":{\"model\":\"claude-sonnet-4-20250514\",",
            "\"usage\":{\"input_tokens\":100,\"output_tokens\":0,\"cache_creation_input_tokens\":0,\"cache_read_input_tokens\":50}}}\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"usage\":{\"output_tokens\":250}}}\n",
            "data: [DONE]\n",
        );
        let result = meter(body.as_bytes(), "text/event-stream", TokenTimings::default(), 1.0);
        assert_eq!(result.model, "claude-sonnet-4-20250514");
        assert_eq!(result.counts.input, 100);
        assert_eq!(result.counts.output, 250);
        assert_eq!(result.counts.cache_read, 50);
    }

    #[test]
    fn non_sse_json_reads_root_usage_and_model() {
        let body = br#"{"model":"claude-3-5-haiku-20241022","usage":{"input_tokens":10,"output_tokens":20}}"#;
        let result = meter(body, "application/json", TokenTimings::default(), 0.5);
        assert_eq!(result.model, "claude-3-5-haiku-20241022");
        assert_eq!(result.counts.input, 10);
        assert_eq!(result.counts.output, 20);
    }

    #[test]
    fn malformed_body_degrades_to_unknown_with_zero_counts() {
        let result = meter(b"not json at all", "application/json", TokenTimings::default(), 2.0);
        assert_eq!(result.model, "unknown");
        assert_eq!(result.counts.input, 0);
        assert_eq!(result.generation_time, 2.0);
        assert_eq!(result.output_tps, 0.0);
    }

    #[test]
    fn output_tps_is_zero_without_output_tokens() {
        let result = meter(b"{}", "application/json", TokenTimings::default(), 5.0);
        assert_eq!(result.output_tps, 0.0);
        assert_eq!(result.generation_time, 5.0);
    }
}
