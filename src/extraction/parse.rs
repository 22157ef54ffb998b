//! Extraction response parsing
//!
//! Two entry points: `parse_extraction` for per-chunk responses, which must be
//! a JSON document as a whole, and `parse_lenient` for deduplication
//! responses, which are located inside free text first. Both go through the
//! same node reader, which accepts the nested `{detail: {type, value}}` shape
//! as well as the flat `{type, value}` shape and skips malformed entries.

use super::types::{Evidence, FactCandidate, Layer, LayeredFacts};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn fenced_block() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok())
        .as_ref()
}

fn comment_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^//.*$").ok()).as_ref()
}

/// Locate the JSON payload inside free text.
///
/// A fenced code block wins; otherwise the span from the first `{` to the
/// last `}`; otherwise the raw text. Lines starting with `//` are removed.
pub fn locate_json(text: &str) -> String {
    let fenced = fenced_block().and_then(|re| re.captures(text));
    let candidate = if let Some(caps) = fenced {
        caps.get(1).map_or(text, |m| m.as_str())
    } else {
        match (text.find('{'), text.rfind('}')) {
            (Some(first), Some(last)) if first < last => &text[first..=last],
            _ => text,
        }
    };
    match comment_line() {
        Some(re) => re.replace_all(candidate, "").trim().to_string(),
        None => candidate.trim().to_string(),
    }
}

/// Parse a per-chunk extraction response.
///
/// The response must be a JSON object as a whole. Unknown layer keys are
/// ignored; layer keys that are present are kept even when empty.
pub fn parse_extraction(text: &str) -> Result<LayeredFacts> {
    let value: Value = serde_json::from_str(text.trim())?;
    layered_from_value(value)
}

/// Parse a deduplication response after locating the JSON inside it
pub fn parse_lenient(text: &str) -> Result<LayeredFacts> {
    let located = locate_json(text);
    let value: Value = serde_json::from_str(&located)?;
    layered_from_value(value)
}

fn layered_from_value(value: Value) -> Result<LayeredFacts> {
    let Value::Object(map) = value else {
        return Err(Error::Extraction(
            "response is not a JSON object".to_string(),
        ));
    };

    let mut facts = LayeredFacts::new();
    for (key, nodes) in map {
        let layer: Layer = match key.parse() {
            Ok(layer) => layer,
            Err(_) => {
                tracing::debug!(key = %key, "Ignoring unknown layer key");
                continue;
            }
        };
        let bucket = facts.ensure_layer(layer);
        let Value::Array(nodes) = nodes else {
            tracing::warn!(layer = %layer, "Layer value is not a list, treating as empty");
            continue;
        };
        for node in nodes {
            match read_node(layer, &node) {
                Some(candidate) => bucket.push(candidate),
                None => tracing::warn!(layer = %layer, "Skipping malformed fact entry"),
            }
        }
    }
    Ok(facts)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_node(layer: Layer, node: &Value) -> Option<FactCandidate> {
    let obj = node.as_object()?;
    let detail: &Map<String, Value> = match obj.get("detail") {
        Some(Value::Object(detail)) => detail,
        _ => obj,
    };

    let fact_type = detail.get("type").and_then(scalar_text)?;
    let value = detail.get("value").and_then(scalar_text)?;
    if fact_type.trim().is_empty() {
        return None;
    }

    let confidence = obj
        .get("confidence")
        .and_then(|c| match c {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(f64::NAN);

    let evidence = obj
        .get("evidence")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(read_evidence).collect())
        .unwrap_or_default();

    Some(FactCandidate {
        layer,
        fact_type,
        value,
        confidence,
        evidence,
        ownership_reason: obj.get("ownership_reason").and_then(scalar_text),
        timestamp: obj.get("timestamp").and_then(scalar_text),
    })
}

fn read_evidence(entry: &Value) -> Option<Evidence> {
    let obj = entry.as_object()?;
    let message_id = obj.get("message_id").and_then(scalar_text)?;
    let snippet = obj
        .get("snippet")
        .or_else(|| obj.get("message_snippet"))
        .and_then(scalar_text)
        .unwrap_or_default();
    Some(Evidence {
        message_id,
        snippet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_prefers_fenced_block() {
        let text = "Here you go {not this}\n```json\n{\"Layer1\": []}\n```\ntrailing }";
        assert_eq!(locate_json(text), "{\"Layer1\": []}");
    }

    #[test]
    fn test_locate_brace_span() {
        let text = "Result: {\"Layer1\": [{\"type\": \"a\"}]} done";
        assert_eq!(locate_json(text), "{\"Layer1\": [{\"type\": \"a\"}]}");
    }

    #[test]
    fn test_locate_raw_fallback_and_comment_stripping() {
        assert_eq!(locate_json("  nothing here "), "nothing here");
        let text = "{\n// merged two phone numbers\n\"Layer1\": []\n}";
        let located = locate_json(text);
        assert!(!located.contains("//"));
        assert!(serde_json::from_str::<Value>(&located).is_ok());
    }

    #[test]
    fn test_parse_extraction_nested_shape() {
        let text = r#"{
            "Layer1": [{
                "detail": {"type": "phone_number", "value": 9876543210},
                "confidence": 0.95,
                "evidence": [{"message_id": 17, "message_snippet": "My phone number is 9876543210"}],
                "timestamp": "2025-09-13 00:00:00",
                "ownership_reason": "first person claim"
            }],
            "Layer2": [],
            "Layer9": [{"detail": {"type": "x", "value": "y"}}]
        }"#;
        let facts = parse_extraction(text).unwrap();
        assert_eq!(facts.layer_keys().len(), 2);

        let phone = &facts.get(Layer::Identity).unwrap()[0];
        assert_eq!(phone.value, "9876543210");
        assert_eq!(phone.evidence[0].message_id, "17");
        assert_eq!(phone.evidence[0].snippet, "My phone number is 9876543210");
        assert_eq!(phone.ownership_reason.as_deref(), Some("first person claim"));
    }

    #[test]
    fn test_parse_extraction_rejects_prose() {
        assert!(parse_extraction("Sure! {\"Layer1\": []}").is_err());
        assert!(parse_extraction("[1, 2]").is_err());
    }

    #[test]
    fn test_parse_lenient_flat_shape_skips_malformed() {
        let text = "```\n{\"Layer1\": [\
            {\"type\": \"email\", \"value\": \"a@b.com\", \"confidence\": 0.9, \"evidence\": [{\"message_id\": \"m1\", \"snippet\": \"a@b.com\"}]},\
            {\"value\": \"missing type\"},\
            \"not an object\"\
        ]}\n```";
        let facts = parse_lenient(text).unwrap();
        let layer1 = facts.get(Layer::Identity).unwrap();
        assert_eq!(layer1.len(), 1);
        assert_eq!(layer1[0].fact_type, "email");
    }

    #[test]
    fn test_missing_confidence_is_nan() {
        let facts = parse_lenient(r#"{"Layer4": [{"type": "habit", "value": "yoga"}]}"#).unwrap();
        assert!(facts.get(Layer::Preferences).unwrap()[0].confidence.is_nan());
    }
}
