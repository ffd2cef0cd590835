//! Request normalization.
//!
//! Callers send one of two historical payload shapes:
//!
//! ```text
//! Single:        { "message": "hi", "model": "X" }
//! Conversation:  { "messages": [{ "content": "hi" }], "bot_name": "X" }
//! ```
//!
//! Both are detected into [`LegacyRequest`] and lowered to one [`ChatRequest`].
//! Anything unusable (not JSON, not an object, no text) is a validation error.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::RelayError;

/// The single-message payload shape.
#[derive(Debug, Clone, Deserialize)]
pub struct SinglePayload {
    #[serde(default)]
    pub message: Value,
    #[serde(default, deserialize_with = "string_or_absent")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub stream: bool,
}

/// One entry of a conversation payload. Only `content` is read.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub content: Value,
}

/// The conversation payload shape. Only the first turn is forwarded.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPayload {
    pub messages: Vec<ConversationTurn>,
    #[serde(default, deserialize_with = "string_or_absent")]
    pub bot_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_absent")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub stream: bool,
}

/// Model names that are not JSON strings are treated as absent.
fn string_or_absent<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Only a literal `true` requests streaming.
fn flag_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// A request body in either accepted shape.
#[derive(Debug, Clone)]
pub enum LegacyRequest {
    Single(SinglePayload),
    Conversation(ConversationPayload),
}

impl LegacyRequest {
    /// Detect the payload shape. A `messages` array selects the conversation shape.
    pub fn detect(value: Value) -> Result<Self, RelayError> {
        if !value.is_object() {
            return Err(RelayError::missing_message());
        }
        let is_conversation = value.get("messages").is_some_and(Value::is_array);

        let parsed = if is_conversation {
            serde_json::from_value(value).map(LegacyRequest::Conversation)
        } else {
            serde_json::from_value(value).map(LegacyRequest::Single)
        };
        parsed.map_err(|e| {
            tracing::debug!(error = %e, "Request body did not match its detected shape");
            RelayError::missing_message()
        })
    }

    fn into_parts(self) -> (Value, Option<String>, bool) {
        match self {
            LegacyRequest::Single(p) => (p.message, p.model, p.stream),
            LegacyRequest::Conversation(p) => {
                let text = p
                    .messages
                    .into_iter()
                    .next()
                    .map(|turn| turn.content)
                    .unwrap_or(Value::Null);
                let model = non_blank(p.bot_name).or_else(|| non_blank(p.model));
                (text, model, p.stream)
            }
        }
    }
}

/// The canonical request forwarded upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Non-empty user text.
    pub text: String,
    /// Model id, already resolved against the configured default.
    pub model: String,
    /// Whether the caller asked for a streamed reply.
    pub stream: bool,
}

/// Lowers caller payloads to [`ChatRequest`].
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    default_model: String,
}

impl RequestNormalizer {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }

    /// Normalize a raw request body.
    pub fn normalize_bytes(&self, body: &[u8]) -> Result<ChatRequest, RelayError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| RelayError::missing_message())?;
        self.normalize(LegacyRequest::detect(value)?)
    }

    pub fn normalize(&self, request: LegacyRequest) -> Result<ChatRequest, RelayError> {
        let (text, model, stream) = request.into_parts();

        let text = match text {
            Value::String(s) if !s.trim().is_empty() => s,
            _ => return Err(RelayError::missing_message()),
        };
        let model = non_blank(model).unwrap_or_else(|| self.default_model.clone());

        Ok(ChatRequest { text, model, stream })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn normalizer() -> RequestNormalizer {
        RequestNormalizer::new("default-bot")
    }

    fn normalize(value: Value) -> Result<ChatRequest, RelayError> {
        normalizer().normalize(LegacyRequest::detect(value)?)
    }

    #[test]
    fn test_both_shapes_yield_same_text() {
        let single = normalize(json!({ "message": "hi" })).unwrap();
        let conversation = normalize(json!({ "messages": [{ "content": "hi" }] })).unwrap();
        assert_eq!(single.text, "hi");
        assert_eq!(conversation.text, "hi");
        assert_eq!(single, conversation);
    }

    #[test]
    fn test_model_resolution() {
        let req = normalize(json!({ "message": "hi", "model": "GPT-4o" })).unwrap();
        assert_eq!(req.model, "GPT-4o");

        let req = normalize(json!({ "messages": [{ "content": "hi" }], "bot_name": "Claude" }))
            .unwrap();
        assert_eq!(req.model, "Claude");

        let req = normalize(json!({
            "messages": [{ "content": "hi" }],
            "bot_name": "",
            "model": "fallback"
        }))
        .unwrap();
        assert_eq!(req.model, "fallback");

        let req = normalize(json!({ "message": "hi" })).unwrap();
        assert_eq!(req.model, "default-bot");
    }

    #[test]
    fn test_only_first_turn_is_used() {
        let req = normalize(json!({
            "messages": [{ "content": "first" }, { "content": "second" }]
        }))
        .unwrap();
        assert_eq!(req.text, "first");
    }

    #[test]
    fn test_stream_flag_carried() {
        let req = normalize(json!({ "message": "hi", "stream": true })).unwrap();
        assert!(req.stream);
        let req = normalize(json!({ "message": "hi" })).unwrap();
        assert!(!req.stream);
    }

    #[test]
    fn test_rejects_missing_or_empty_text() {
        let cases = [
            json!({}),
            json!({ "message": "" }),
            json!({ "message": "   " }),
            json!({ "message": 42 }),
            json!({ "message": null }),
            json!({ "messages": [] }),
            json!({ "messages": [{ "role": "user" }] }),
            json!({ "messages": [{ "content": ["hi"] }] }),
            json!({ "messages": ["hi"] }),
            json!("hi"),
            json!([1, 2, 3]),
        ];
        for case in cases {
            let err = normalize(case.clone()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "case: {case}");
        }
    }

    #[test]
    fn test_malformed_bytes_degrade_to_validation_error() {
        let err = normalizer().normalize_bytes(b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("message"));

        let err = normalizer().normalize_bytes(b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_non_string_model_is_ignored() {
        let req = normalize(json!({ "message": "hi", "model": 5 })).unwrap();
        assert_eq!(req.text, "hi");
        assert_eq!(req.model, "default-bot");

        let req = normalize(json!({
            "messages": [{ "content": "hi" }],
            "bot_name": { "id": 1 },
            "model": "GPT-4o"
        }))
        .unwrap();
        assert_eq!(req.model, "GPT-4o");

        let req = normalize(json!({ "message": "hi", "stream": "yes" })).unwrap();
        assert!(!req.stream);
    }

    #[test]
    fn test_non_array_messages_falls_back_to_single_shape() {
        let req = normalize(json!({ "messages": "ignored", "message": "hi" })).unwrap();
        assert_eq!(req.text, "hi");
    }
}
