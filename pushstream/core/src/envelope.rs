//! Wire Envelopes
//!
//! Every message pushed to a remote client is an [`Envelope`]: a type tag, an
//! optional item id, a free-form JSON payload and a UTC timestamp. Envelopes
//! are built unstamped and receive their timestamp when the stream manager
//! pushes them, so the timestamp reflects delivery time rather than the time
//! the payload was computed.
//!
//! # Wire Shape
//!
//! ```text
//! {
//!   "type": "ITEM_COMPLETE",
//!   "item_id": 7,
//!   "data": { ... },
//!   "timestamp": "2024-05-01T12:00:00.123456Z"
//! }
//! ```

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Message Type
// ============================================================================

/// Open-set envelope type tag
///
/// The well-known tags are exposed as associated constants; any other string
/// is accepted so downstream producers can introduce their own tags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(pub Cow<'static, str>);

impl MessageType {
    /// A fresh query item started executing
    pub const ITEM_START: Self = Self::from_static("ITEM_START");
    /// The item handler asked the client to run a tool
    pub const TOOL_USE_REQUEST: Self = Self::from_static("TOOL_USE_REQUEST");
    /// The item handler finished successfully
    pub const ITEM_COMPLETE: Self = Self::from_static("ITEM_COMPLETE");
    /// The item handler reported a structured error
    pub const ITEM_ERROR: Self = Self::from_static("ITEM_ERROR");
    /// The item handler failed outright
    pub const ITEM_FAIL: Self = Self::from_static("ITEM_FAIL");
    /// Post-processing started
    pub const POST_PROCESS_START: Self = Self::from_static("POST_PROCESS_START");
    /// Post-processing finished
    pub const POST_PROCESS_COMPLETE: Self = Self::from_static("POST_PROCESS_COMPLETE");
    /// Post-processing failed
    pub const POST_PROCESS_ERROR: Self = Self::from_static("POST_PROCESS_ERROR");
    /// Heartbeat
    pub const IN_PROGRESS: Self = Self::from_static("IN_PROGRESS");
    /// Stream-level error not tied to an item
    pub const STREAM_ERROR: Self = Self::from_static("STREAM_ERROR");
    /// Terminal marker
    pub const STREAM_END: Self = Self::from_static("STREAM_END");

    /// Create a tag from a static string
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Create a tag from any string
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// The tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the terminal marker
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.as_str() == Self::STREAM_END.as_str()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for MessageType {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One discrete wire message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type tag
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Item this message belongs to, if any
    #[serde(default)]
    pub item_id: Option<i64>,
    /// Free-form payload
    #[serde(default)]
    pub data: Map<String, Value>,
    /// UTC push time, set by [`Envelope::stamped`]
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Envelope {
    /// Create an unstamped envelope with an empty payload
    pub fn new(kind: impl Into<MessageType>) -> Self {
        Self {
            kind: kind.into(),
            item_id: None,
            data: Map::new(),
            timestamp: None,
        }
    }

    /// Attach an item id
    #[must_use]
    pub fn with_item_id(mut self, item_id: i64) -> Self {
        self.item_id = Some(item_id);
        self
    }

    /// Replace the payload
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Insert one payload field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Convenience for `{"message": text}` payloads
    #[must_use]
    pub fn with_message(self, text: impl Into<String>) -> Self {
        self.with_field("message", text.into())
    }

    /// Return a copy stamped with the given push time
    #[must_use]
    pub fn stamped(&self, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ..self.clone()
        }
    }

    /// Payload `message` field, if it is a string
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    /// Serialize to the wire representation
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<MessageType> for Envelope {
    fn from(kind: MessageType) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_new_envelope_is_unstamped() {
        let env = Envelope::new(MessageType::IN_PROGRESS);
        assert!(env.timestamp.is_none());
        assert!(env.item_id.is_none());
        assert!(env.data.is_empty());
    }

    #[test]
    fn test_stamped_leaves_original_untouched() {
        let env = Envelope::new(MessageType::ITEM_COMPLETE).with_item_id(3);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let stamped = env.stamped(at);

        assert!(env.timestamp.is_none());
        assert_eq!(
            stamped.timestamp.as_deref(),
            Some("2024-05-01T12:00:00.000000Z")
        );
        assert_eq!(stamped.item_id, Some(3));
    }

    #[test]
    fn test_wire_shape() {
        let env = Envelope::new(MessageType::STREAM_ERROR).with_message("nope");
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "STREAM_ERROR",
                "item_id": null,
                "data": {"message": "nope"},
                "timestamp": null
            })
        );
    }

    #[test]
    fn test_decode_defaults_missing_fields() {
        let env: Envelope = serde_json::from_str(r#"{"type":"CUSTOM_TAG"}"#).unwrap();
        assert_eq!(env.kind, MessageType::new("CUSTOM_TAG"));
        assert!(env.data.is_empty());
        assert!(!env.kind.is_terminal());
    }

    #[test]
    fn test_terminal_tag() {
        assert!(MessageType::STREAM_END.is_terminal());
        assert!(MessageType::new("STREAM_END").is_terminal());
        assert_eq!(MessageType::STREAM_END.to_string(), "STREAM_END");
    }
}
