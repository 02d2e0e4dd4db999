//! Turns loosely-structured model output into parsed JSON.
//!
//! Model responses arrive in several envelope shapes, are often wrapped in
//! markdown code fences, and sometimes contain control characters that break
//! strict parsing. Callers are expected to catch `NormalizeError` and
//! substitute a domain-specific fallback; a raw parse error never reaches
//! the UI.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").unwrap());
static OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Parse failure, carrying both the original and the cleaned text for
/// diagnostics.
#[derive(Debug, Error)]
#[error("failed to parse model response as JSON: {source}")]
pub struct NormalizeError {
    pub original: String,
    pub cleaned: String,
    #[source]
    pub source: serde_json::Error,
}

/// Extract the response text from the known envelope shapes, in order:
/// the nested candidates/content/parts path, a plain string `text` field,
/// an object `text` field with `response`/`text` sub-fields, and finally a
/// stringification of whatever is there.
pub fn extract_text(response: &Value) -> String {
    if let Some(text) = response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
    {
        return text.to_string();
    }

    match response.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(map)) => map
            .get("response")
            .and_then(Value::as_str)
            .or_else(|| map.get("text").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Isolate the JSON payload within free-form model text: a fenced code
/// block wins, else the first `{...}` span, else the whole text.
fn isolate_json(text: &str) -> &str {
    if let Some(captures) = FENCE_RE.captures(text) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str();
        }
    }
    if let Some(m) = OBJECT_RE.find(text) {
        return m.as_str();
    }
    text
}

/// Replace control characters (C0 and 0x7F-0x9F) with spaces. Newline,
/// carriage return and tab are kept; they may be meaningful inside JSON
/// string values.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => c,
            c if (c as u32) < 0x20 || (0x7F..=0x9F).contains(&(c as u32)) => ' ',
            c => c,
        })
        .collect()
}

/// Parse free-form model text into JSON.
pub fn normalize_payload(text: &str) -> Result<Value, NormalizeError> {
    let isolated = isolate_json(text.trim());
    let cleaned = strip_control_chars(isolated);

    serde_json::from_str(&cleaned).map_err(|source| NormalizeError {
        original: text.to_string(),
        cleaned,
        source,
    })
}

/// Extraction and parsing in one step, for callers holding a raw upstream
/// response.
pub fn normalize_response(response: &Value) -> Result<Value, NormalizeError> {
    normalize_payload(&extract_text(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_candidates_path() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
        });
        assert_eq!(extract_text(&response), "hello");
    }

    #[test]
    fn test_extracts_text_field_variants() {
        assert_eq!(extract_text(&json!({"text": "plain"})), "plain");
        assert_eq!(
            extract_text(&json!({"text": {"response": "wrapped"}})),
            "wrapped"
        );
        assert_eq!(
            extract_text(&json!({"text": {"text": "doubly wrapped"}})),
            "doubly wrapped"
        );
        assert_eq!(extract_text(&json!({})), "");
    }

    #[test]
    fn test_fenced_and_bare_json_normalize_identically() {
        let bare = r#"{"min_price": 20, "market_trend": "rising"}"#;
        let fenced = format!("```json\n{bare}\n```");
        let unfenced = normalize_payload(bare).unwrap();
        assert_eq!(normalize_payload(&fenced).unwrap(), unfenced);
        // A fence without a language tag parses the same way.
        let plain_fence = format!("```\n{bare}\n```");
        assert_eq!(normalize_payload(&plain_fence).unwrap(), unfenced);
    }

    #[test]
    fn test_object_span_extracted_from_prose() {
        let text = "Sure! Here is the result: {\"tone\": \"friendly\"} Hope that helps.";
        let parsed = normalize_payload(text).unwrap();
        assert_eq!(parsed["tone"], "friendly");
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let text = "{\"reasoning\": \"good\u{0000} price\u{0085}\"}";
        let parsed = normalize_payload(text).unwrap();
        assert_eq!(parsed["reasoning"], "good  price ");
    }

    #[test]
    fn test_parse_failure_carries_diagnostics() {
        let err = normalize_payload("no json here at all").unwrap_err();
        assert_eq!(err.original, "no json here at all");
        assert!(!err.cleaned.is_empty());
    }
}
