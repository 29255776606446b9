//! Event types for the realtime connection.
//!
//! Events are JSON objects discriminated by their `type` field. The relay
//! only needs four fields, so a single flat struct covers every event type:
//! fields an event does not carry decode to their defaults. Some event types
//! reuse `channel` for an object (`channel_created`) or send `null`; those
//! decode as empty strings as well.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Event type of user-authored chat messages.
pub const MESSAGE_TYPE: &str = "message";

/// A realtime event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Outbound sequence number, unique per connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Event type (`message`, `hello`, `user_typing`, ...).
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,

    /// Channel ID the event belongs to.
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: String,

    /// Message text.
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,

    /// Timestamp in `<seconds>.<micros>` form.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ts: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

impl Event {
    /// Create a new `message` event.
    #[must_use]
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: MESSAGE_TYPE.to_string(),
            channel: channel.into(),
            text: text.into(),
            ts: None,
        }
    }

    /// Whether this is a user-authored chat message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructor() {
        let event = Event::message("C1", "hello");
        assert!(event.is_message());
        assert_eq!(event.channel, "C1");
        assert_eq!(event.text, "hello");
        assert!(event.ts.is_none());
        assert!(event.id.is_none());
    }

    #[test]
    fn test_non_message_kind() {
        let event = Event {
            kind: "user_typing".into(),
            ..Default::default()
        };
        assert!(!event.is_message());
    }

    #[test]
    fn test_non_string_fields_decode_empty() {
        let event: Event = serde_json::from_str(
            r#"{"type":"channel_created","channel":{"id":"C9","name":"ops"},"text":null,"ts":7}"#,
        )
        .unwrap();
        assert_eq!(event.kind, "channel_created");
        assert_eq!(event.channel, "");
        assert_eq!(event.text, "");
        assert!(event.ts.is_none());
    }

    #[test]
    fn test_string_fields_still_decode() {
        let event: Event = serde_json::from_str(
            r#"{"type":"message","channel":"C1","text":"hi","ts":"1355517523.000005"}"#,
        )
        .unwrap();
        let mut expected = Event::message("C1", "hi");
        expected.ts = Some("1355517523.000005".into());
        assert_eq!(event, expected);
    }
}
