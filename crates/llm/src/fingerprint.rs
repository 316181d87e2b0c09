//! Content fingerprinting for cache keys.
//!
//! A fingerprint is a 256-bit digest over the subset of a request that
//! determines its output: messages, model, the sampling parameters that
//! affect generation, and tool definitions. Two requests that would produce
//! the same upstream call must fingerprint identically regardless of map-key
//! order in their JSON representation.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::messages::unified::{UnifiedRequest, UnifiedTool, UnifiedToolChoice};

/// A 256-bit content fingerprint, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct FingerprintSubject<'a> {
    model: &'a str,
    messages: &'a [crate::messages::unified::UnifiedMessage],
    system: &'a Option<String>,
    max_tokens: &'a Option<u32>,
    temperature: &'a Option<f32>,
    top_p: &'a Option<f32>,
    top_k: &'a Option<u32>,
    frequency_penalty: &'a Option<f32>,
    presence_penalty: &'a Option<f32>,
    stop_sequences: &'a Option<Vec<String>>,
    tools: &'a Option<Vec<UnifiedTool>>,
    tool_choice: &'a Option<UnifiedToolChoice>,
}

/// Compute the content fingerprint of a request's output-determining fields.
pub(crate) fn of_request(request: &UnifiedRequest) -> Fingerprint {
    let subject = FingerprintSubject {
        model: &request.model,
        messages: &request.messages,
        system: &request.system,
        max_tokens: &request.max_tokens,
        temperature: &request.temperature,
        top_p: &request.top_p,
        top_k: &request.top_k,
        frequency_penalty: &request.frequency_penalty,
        presence_penalty: &request.presence_penalty,
        stop_sequences: &request.stop_sequences,
        tools: &request.tools,
        tool_choice: &request.tool_choice,
    };

    of_value(&serde_json::to_value(&subject).unwrap_or(serde_json::Value::Null))
}

/// Compute a fingerprint over an arbitrary canonicalized value, such as a
/// router selection key (prompt text, cost bias, candidate model set).
pub(crate) fn of_value(value: &serde_json::Value) -> Fingerprint {
    let canonical = canonicalize(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Fingerprint(encode_hex(&hasher.finalize()))
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

/// Recursively sort object keys so two structurally-equal values serialize
/// identically regardless of original key order.
fn canonicalize(value: &serde_json::Value) -> String {
    fn sorted(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));

                let mut sorted_map = serde_json::Map::new();
                for (k, v) in entries {
                    sorted_map.insert(k.clone(), sorted(v));
                }
                serde_json::Value::Object(sorted_map)
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }

    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedContentContainer, UnifiedDialect, UnifiedMessage, UnifiedRole};

    fn sample_request(model: &str) -> UnifiedRequest {
        UnifiedRequest {
            model: model.to_string(),
            messages: vec![UnifiedMessage {
                role: UnifiedRole::User,
                content: UnifiedContentContainer::Text("hello there".to_string()),
                tool_calls: None,
                tool_call_id: None,
            }],
            system: None,
            max_tokens: Some(128),
            temperature: Some(0.7),
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
            dialect: UnifiedDialect::Openai,
            provider_overrides: None,
            router_config: None,
            cache_config: None,
            fallback_config: None,
        }
    }

    #[test]
    fn identical_requests_fingerprint_identically() {
        let a = of_request(&sample_request("gpt-4"));
        let b = of_request(&sample_request("gpt-4"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_models_fingerprint_differently() {
        let a = of_request(&sample_request("gpt-4"));
        let b = of_request(&sample_request("gpt-4o"));
        assert_ne!(a, b);
    }

    #[test]
    fn key_order_does_not_affect_value_fingerprint() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(of_value(&a), of_value(&b));
    }

    #[test]
    fn fingerprint_is_sixty_four_hex_chars() {
        let f = of_request(&sample_request("gpt-4"));
        assert_eq!(f.as_str().len(), 64);
        assert!(f.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
