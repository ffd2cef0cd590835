//! Reply envelope and text extraction from upstream completions.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Sent in place of the reply when the completion carried no text.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "❌ The assistant returned no usable reply";

/// Successful response body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(rename = "model")]
    pub model_used: String,
    #[serde(rename = "timestamp")]
    pub timestamp_iso: String,
}

impl ChatReply {
    pub fn new(text: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model_used: model_used.into(),
            timestamp_iso: now_iso(),
        }
    }
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pull `choices[0].message.content` out of a completion body.
pub fn extract_reply_text(completion: &Value) -> String {
    completion
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| EMPTY_REPLY_PLACEHOLDER.to_string())
}

/// First `max` characters of `text`, for logging and error echoes.
pub fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
