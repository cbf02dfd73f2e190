//! Turns the raw body returned by the inference API into wound records.
//!
//! The model answers with free text inside the response envelope. That text
//! is expected to be JSON, but is sometimes wrapped in a markdown code fence,
//! so parsing is tolerant. A reply that cannot be used at all is reported as
//! an `AdapterError`, which the server turns into an empty result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Allowed severity range
pub const SEVERITY: std::ops::RangeInclusive<u8> = 1..=5;

/// Visual description of a wound
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Appearance {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub texture: String,
}

/// One wound detected by the remote model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WoundRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub infection: String,
    pub severity: u8,
}

#[derive(Debug, Error, PartialEq)]
pub enum AdapterError {
    #[error("response body is not JSON: {0}")]
    Envelope(String),

    #[error("response has no candidates[0].content.parts[0].text")]
    MissingText,

    #[error("model reply is not JSON: {0}")]
    Reply(String),

    #[error("model reply has no 'data' field")]
    MissingData,

    #[error("'data' is neither a list nor a record: {0}")]
    Records(String),
}

/// Pull the model's text out of the response envelope
pub fn extract_text(raw: &str) -> Result<String, AdapterError> {
    let envelope: Value =
        serde_json::from_str(raw).map_err(|e| AdapterError::Envelope(e.to_string()))?;

    envelope
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AdapterError::MissingText)
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````)
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // The opening fence runs to the end of its line and may name a language
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches("json"),
    };

    body.trim_end().trim_end_matches("```").trim()
}

/// Parse the inference API body into the full list of wound records.
///
/// Each entry of `data` is checked on its own: an entry that is not a valid
/// record, or whose severity is outside 1..=5, is dropped without affecting
/// the others. The caller answers with an empty result on `Err`
pub fn parse_reply(raw: &str) -> Result<Vec<WoundRecord>, AdapterError> {
    let text = extract_text(raw)?;
    let mut reply: Value = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| AdapterError::Reply(e.to_string()))?;

    // `data` is normally a list, but a lone record is accepted too
    let entries = match reply.get_mut("data").map(Value::take) {
        Some(Value::Array(entries)) => entries,
        Some(entry @ Value::Object(_)) => vec![entry],
        Some(other) => return Err(AdapterError::Records(other.to_string())),
        None => return Err(AdapterError::MissingData),
    };

    Ok(entries.into_iter().filter_map(to_record).collect())
}

fn to_record(entry: Value) -> Option<WoundRecord> {
    let severity = entry.get("severity").cloned();
    match serde_json::from_value::<WoundRecord>(entry) {
        Ok(record) if SEVERITY.contains(&record.severity) => Some(record),
        Ok(record) => {
            warn!("dropping '{}' record with severity {}", record.kind, record.severity);
            None
        }
        Err(e) => {
            warn!("dropping malformed record (severity {severity:?}): {e}");
            None
        }
    }
}
