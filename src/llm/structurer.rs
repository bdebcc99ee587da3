//! Turns raw OCR text into candidate receipt fields.
//!
//! The model is asked for a bare JSON object, but responses routinely arrive
//! wrapped in markdown fencing or explanatory prose, so the payload is
//! recovered by scanning for the first balanced object rather than parsing
//! the response as-is. The resulting fields stay untyped strings except for
//! the amount, which is coerced from common currency formatting here so the
//! validator only sees plain decimals.

use async_trait::async_trait;
use serde_json::Value;

use super::client::{GeminiClient, StructuringError};
use super::prompts::EXTRACTION_PROMPT;
use crate::models::ReceiptDraft;
use crate::utils::normalize_fullwidth;

/// Produces candidate receipt fields from raw OCR text.
///
/// A trait so the pipeline can run against a test double without a live
/// model service.
#[async_trait]
pub trait Structurer: Send + Sync {
    async fn structure(&self, raw_text: &str) -> Result<ReceiptDraft, StructuringError>;
}

/// Gemini-backed structurer.
pub struct GeminiStructurer {
    client: GeminiClient,
}

impl GeminiStructurer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    /// Build the extraction prompt, truncating oversized OCR text at a
    /// UTF-8 boundary.
    fn build_prompt(&self, raw_text: &str) -> String {
        let max = self.client.config().max_content_chars;
        let truncated = truncate_utf8(raw_text, max);
        EXTRACTION_PROMPT.replace("{text}", truncated.trim())
    }
}

#[async_trait]
impl Structurer for GeminiStructurer {
    async fn structure(&self, raw_text: &str) -> Result<ReceiptDraft, StructuringError> {
        let prompt = self.build_prompt(raw_text);
        let response = self.client.generate(&prompt).await?;
        parse_response(&response)
    }
}

/// Truncate to a maximum byte length at a valid UTF-8 boundary.
fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Parse a model response into candidate fields.
///
/// Accepts fenced, prose-wrapped, or bare JSON. Fails with a `Parse` error
/// carrying the raw response when no balanced object can be recovered.
pub fn parse_response(response: &str) -> Result<ReceiptDraft, StructuringError> {
    let payload = extract_json_payload(response).ok_or_else(|| StructuringError::Parse {
        reason: "no JSON object in model response".to_string(),
        raw: response.to_string(),
    })?;

    let value: Value = serde_json::from_str(payload).map_err(|e| StructuringError::Parse {
        reason: format!("invalid JSON payload: {}", e),
        raw: response.to_string(),
    })?;

    let obj = value.as_object().ok_or_else(|| StructuringError::Parse {
        reason: "JSON payload is not an object".to_string(),
        raw: response.to_string(),
    })?;

    Ok(ReceiptDraft {
        date: string_field(obj.get("date")),
        vendor: string_field(obj.get("vendor")),
        amount: amount_field(obj.get("amount")),
        description: text_field(obj.get("description")),
        issuer: string_field(obj.get("issuer")),
        recipient: string_field(obj.get("recipient")),
        has_revenue_stamp: tristate_field(obj.get("has_revenue_stamp")),
    })
}

/// Extract the first balanced JSON object from text.
///
/// Scans from the first `{`, tracking brace depth while skipping string
/// literals and escapes, so fencing and surrounding prose fall away.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A non-empty trimmed string, or absent.
fn string_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A string field where empty is meaningful (description may be blank).
fn text_field(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).map(|s| s.trim().to_string())
}

/// Amount as a plain decimal, coercing formatted strings.
fn amount_field(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => coerce_amount(s),
        _ => None,
    }
}

/// Tri-state stamp flag: explicit booleans only, never defaulted.
fn tristate_field(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Coerce common currency formatting into a plain decimal.
///
/// Handles thousands separators, yen symbols/suffix, and full-width digits:
/// `¥1,000`, `1,000円`, `１，０００円` all become 1000.0.
pub fn coerce_amount(text: &str) -> Option<f64> {
    let normalized = normalize_fullwidth(text);
    let cleaned: String = normalized
        .chars()
        .filter(|c| !matches!(c, ',' | '¥' | '円' | ' '))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_object() {
        let payload = extract_json_payload(r#"{"vendor": "テスト商店"}"#).unwrap();
        assert_eq!(payload, r#"{"vendor": "テスト商店"}"#);
    }

    #[test]
    fn test_extract_fenced_object() {
        let response = "以下が抽出結果です。\n```json\n{\"vendor\": \"テスト商店\", \"amount\": 1000}\n```\nご確認ください。";
        let payload = extract_json_payload(response).unwrap();
        assert_eq!(payload, r#"{"vendor": "テスト商店", "amount": 1000}"#);
    }

    #[test]
    fn test_extract_nested_and_braces_in_strings() {
        let response = r#"note {"a": {"b": 1}, "c": "has } brace"} trailing"#;
        let payload = extract_json_payload(response).unwrap();
        assert_eq!(payload, r#"{"a": {"b": 1}, "c": "has } brace"}"#);
    }

    #[test]
    fn test_extract_none_for_prose() {
        assert!(extract_json_payload("申し訳ありませんが、読み取れませんでした。").is_none());
        assert!(extract_json_payload("unterminated { \"a\": 1").is_none());
    }

    #[test]
    fn test_coerce_amount_formats() {
        assert_eq!(coerce_amount("¥1,000"), Some(1000.0));
        assert_eq!(coerce_amount("１，０００円"), Some(1000.0));
        assert_eq!(coerce_amount("1,000円"), Some(1000.0));
        assert_eq!(coerce_amount("1234.5"), Some(1234.5));
        assert_eq!(coerce_amount("￥３５０"), Some(350.0));
        assert_eq!(coerce_amount("金額不明"), None);
        assert_eq!(coerce_amount(""), None);
    }

    #[test]
    fn test_parse_response_full_record() {
        let response = r#"```json
{
  "date": "2024-01-15",
  "vendor": "テスト商店",
  "amount": "1,000円",
  "description": "テスト購入",
  "issuer": "テスト商店",
  "recipient": "山田太郎",
  "has_revenue_stamp": false
}
```"#;
        let draft = parse_response(response).unwrap();
        assert_eq!(draft.date.as_deref(), Some("2024-01-15"));
        assert_eq!(draft.vendor.as_deref(), Some("テスト商店"));
        assert_eq!(draft.amount, Some(1000.0));
        assert_eq!(draft.description.as_deref(), Some("テスト購入"));
        assert_eq!(draft.issuer.as_deref(), Some("テスト商店"));
        assert_eq!(draft.recipient.as_deref(), Some("山田太郎"));
        assert_eq!(draft.has_revenue_stamp, Some(false));
    }

    #[test]
    fn test_parse_response_stamp_absent_when_unmentioned() {
        let response = r#"{"date": "2024-01-15", "vendor": "A", "amount": 500, "description": "", "issuer": "A"}"#;
        let draft = parse_response(response).unwrap();
        assert_eq!(draft.has_revenue_stamp, None);
        assert_eq!(draft.recipient, None);
    }

    #[test]
    fn test_parse_response_stamp_null_stays_absent() {
        let response = r#"{"vendor": "A", "has_revenue_stamp": null}"#;
        let draft = parse_response(response).unwrap();
        assert_eq!(draft.has_revenue_stamp, None);
    }

    #[test]
    fn test_parse_response_prose_fails() {
        let err = parse_response("この画像は領収書ではないようです。").unwrap_err();
        match err {
            StructuringError::Parse { raw, .. } => {
                assert!(raw.contains("領収書ではない"));
            }
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_array_payload_fails() {
        let err = parse_response("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, StructuringError::Parse { .. }));
    }

    #[test]
    fn test_empty_recipient_becomes_absent() {
        let response = r#"{"vendor": "A", "recipient": ""}"#;
        let draft = parse_response(response).unwrap();
        assert_eq!(draft.recipient, None);
    }

    #[test]
    fn test_truncate_utf8_boundary() {
        let text = "あいうえお";
        let t = truncate_utf8(text, 4);
        assert_eq!(t, "あ");
        assert_eq!(truncate_utf8(text, 100), text);
    }
}
