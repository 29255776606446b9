//! Chat message type used by the router.

use chanrelay_protocol::{Event, MESSAGE_TYPE};

/// A channel identifier.
pub type ChannelId = String;

/// A chat message flowing through the relay pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Event type; only `message` is routed.
    pub kind: String,
    /// Channel the message was posted in, or is to be posted to.
    pub channel: ChannelId,
    /// Message text.
    pub text: String,
    /// Send-time timestamp, assigned by the connection's send loop.
    pub timestamp: Option<String>,
}

impl Message {
    /// Create a new chat message.
    #[must_use]
    pub fn new(channel: impl Into<ChannelId>, text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            channel: channel.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    /// Replace the event type.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Whether this message is user-authored chat text.
    #[must_use]
    pub fn is_chat(&self) -> bool {
        self.kind == MESSAGE_TYPE
    }

    /// Copy of this message addressed to `destination`.
    ///
    /// The timestamp is cleared; the send loop stamps it at transmission.
    #[must_use]
    pub fn routed_to(&self, destination: &str) -> Self {
        Self {
            kind: self.kind.clone(),
            channel: destination.to_string(),
            text: self.text.clone(),
            timestamp: None,
        }
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self {
            kind: event.kind,
            channel: event.channel,
            text: event.text,
            timestamp: event.ts,
        }
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Event {
            id: None,
            kind: message.kind,
            channel: message.channel,
            text: message.text,
            ts: message.timestamp,
        }
    }
}
