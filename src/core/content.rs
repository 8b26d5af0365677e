//! Message content shapes and the text rendering rules applied to them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message body as the backend returns it: a bare string, a list of typed
/// content parts, or something neither shape covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Parts(Vec<ContentPart>),
    Unrecognized(Value),
}

/// One element of a parts list. Decoding never fails: elements that are not
/// `text` parts, and text parts without a string value, render as empty text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: TextValue },
    Other,
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        if raw.get("type").and_then(Value::as_str) != Some("text") {
            return Ok(ContentPart::Other);
        }
        let value = raw
            .get("text")
            .and_then(|t| t.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ContentPart::text(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    #[serde(default)]
    pub value: String,
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text {
            text: TextValue {
                value: value.into(),
            },
        }
    }

    fn rendered(&self) -> &str {
        match self {
            ContentPart::Text { text } => &text.value,
            ContentPart::Other => "",
        }
    }
}

impl MessageContent {
    /// Plain text passes through, text parts are joined by newlines with
    /// non-text parts contributing empty lines, unknown shapes are shown as JSON.
    pub fn render(&self) -> String {
        match self {
            MessageContent::Plain(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(ContentPart::rendered)
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::Unrecognized(value) => value.to_string(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Plain(value.to_string())
    }
}

const EMPHASIS_MARKER: &str = "**";

/// Removes literal `**` markers and leaves every other character alone.
pub fn strip_emphasis(details: &str) -> String {
    details.replace(EMPHASIS_MARKER, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> MessageContent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn plain_string_renders_verbatim() {
        let content = decode(json!("hello there"));
        assert_eq!(content, MessageContent::Plain("hello there".into()));
        assert_eq!(content.render(), "hello there");
    }

    #[test]
    fn text_parts_join_with_newlines() {
        let content = decode(json!([
            {"type": "text", "text": {"value": "first"}},
            {"type": "text", "text": {"value": "second"}}
        ]));
        assert_eq!(content.render(), "first\nsecond");
    }

    #[test]
    fn non_text_parts_contribute_empty_text() {
        let content = decode(json!([
            {"type": "text", "text": {"value": "caption"}},
            {"type": "image_file", "image_file": {"file_id": "f1"}},
            {"type": "text", "text": {"value": "end"}}
        ]));
        assert_eq!(content.render(), "caption\n\nend");
    }

    #[test]
    fn text_part_without_value_is_empty() {
        let content = decode(json!([{"type": "text"}]));
        assert_eq!(content.render(), "");
    }

    #[test]
    fn malformed_parts_do_not_spoil_the_message() {
        let content = decode(json!([
            {"type": "text", "text": {"value": "hello"}},
            {"kind": "image"}
        ]));
        assert!(matches!(content, MessageContent::Parts(_)));
        assert_eq!(content.render(), "hello\n");

        let content = decode(json!([
            {"type": "text", "text": null},
            {"type": "text", "text": "bare"},
            {"type": "text", "text": {"value": "kept"}}
        ]));
        assert_eq!(content.render(), "\n\nkept");

        let content = decode(json!([1, "two", null]));
        assert_eq!(content.render(), "\n\n");
    }

    #[test]
    fn unrecognized_shape_is_serialized_verbatim() {
        let content = decode(json!({"weird": true}));
        assert!(matches!(content, MessageContent::Unrecognized(_)));
        assert_eq!(content.render(), r#"{"weird":true}"#);

        let content = decode(json!(42));
        assert!(matches!(content, MessageContent::Unrecognized(_)));
        assert_eq!(content.render(), "42");
    }

    #[test]
    fn strip_emphasis_only_removes_double_asterisks() {
        assert_eq!(
            strip_emphasis("**Done**: created *user* hr__lookup"),
            "Done: created *user* hr__lookup"
        );
        assert_eq!(strip_emphasis("no markup"), "no markup");
        assert_eq!(strip_emphasis("***"), "*");
    }
}
