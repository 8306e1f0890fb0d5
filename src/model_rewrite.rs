//! Model-name rewriter (C3)
//!
//! Swaps `model` fields (and `tool_use` block names) in a request body per a
//! configured mapping, when the feature flag is on. Decode failures pass the
//! body through unchanged rather than erroring the request.

use std::collections::HashMap;

use glob::Pattern;
use serde_json::Value;
use tokio::sync::RwLock;

/// In-process-only runtime state for the model-swap feature flag and mapping.
/// Seeded from configuration at startup; mutated by the admin API; never
/// persisted, so a restart reverts to the environment defaults.
pub struct ModelSwapState {
    inner: RwLock<(bool, HashMap<String, String>)>,
}

impl ModelSwapState {
    pub fn new(enabled: bool, mapping: HashMap<String, String>) -> Self {
        Self { inner: RwLock::new((enabled, mapping)) }
    }

    pub async fn snapshot(&self) -> (bool, HashMap<String, String>) {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, enabled: bool, mapping: HashMap<String, String>) {
        let mut guard = self.inner.write().await;
        *guard = (enabled, mapping);
    }
}

/// Resolve `model` against `mapping`: exact match first, then the first key
/// containing any of `*?[]` whose glob pattern matches.
fn resolve(model: &str, mapping: &HashMap<String, String>) -> Option<String> {
    if let Some(target) = mapping.get(model) {
        return Some(target.clone());
    }
    for (pattern, target) in mapping {
        if pattern.contains(['*', '?', '[', ']']) {
            if let Ok(glob) = Pattern::new(pattern) {
                if glob.matches(model) {
                    return Some(target.clone());
                }
            }
        }
    }
    None
}

fn rewrite_tool_use_blocks(body: &mut Value, mapping: &HashMap<String, String>) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    for message in messages {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for block in content {
            let Some(obj) = block.as_object_mut() else { continue };
            if obj.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                if let Some(new_name) = resolve(name, mapping) {
                    obj.insert("name".to_string(), Value::String(new_name));
                }
            }
        }
    }
}

/// Rewrite `body` in place per `mapping`. No-op if `enabled` is false, `mapping`
/// is empty, or `body` does not decode as JSON.
pub fn rewrite(body: &[u8], enabled: bool, mapping: &HashMap<String, String>) -> Vec<u8> {
    if !enabled || mapping.is_empty() {
        return body.to_vec();
    }

    let Ok(mut parsed) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };

    if let Some(model) = parsed.get("model").and_then(Value::as_str).map(str::to_string) {
        if let Some(new_model) = resolve(&model, mapping) {
            parsed["model"] = Value::String(new_model);
        }
    }

    rewrite_tool_use_blocks(&mut parsed, mapping);

    serde_json::to_vec(&parsed).unwrap_or_else(|_| body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn disabled_flag_is_a_no_op() {
        let body = br#"{"model":"A"}"#;
        let out = rewrite(body, false, &mapping(&[("A", "B")]));
        assert_eq!(out, body);
    }

    #[test]
    fn exact_match_rewrites_top_level_model() {
        let body = br#"{"model":"A","messages":[]}"#;
        let out = rewrite(body, true, &mapping(&[("A", "B")]));
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["model"], "B");
    }

    #[test]
    fn glob_pattern_rewrites_tool_use_blocks() {
        let body = br#"{"model":"claude-3-5-haiku-20241022","messages":[{"role":"assistant","content":[{"type":"tool_use","name":"claude-3-5-haiku-20241022"}]}]}"#;
        let out = rewrite(body, true, &mapping(&[("claude-3-5-*", "claude-sonnet-4-20250514")]));
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["model"], "claude-sonnet-4-20250514");
        assert_eq!(parsed["messages"][0]["content"][0]["name"], "claude-sonnet-4-20250514");
    }

    #[test]
    fn invalid_json_passes_through_unchanged() {
        let body = b"not json";
        let out = rewrite(body, true, &mapping(&[("A", "B")]));
        assert_eq!(out, body);
    }
}
