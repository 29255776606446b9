//! # chanrelay-protocol
//!
//! Wire format of the realtime chat connection used by chanrelay.
//!
//! Every websocket text frame carries one JSON event. Inbound events come in
//! many types (`hello`, `message`, `user_typing`, `presence_change`, ...);
//! only `message` events are routed. Outbound events are always `message`
//! events with a connection-unique `id` and a send-time `ts`.
//!
//! ## Example
//!
//! ```rust
//! use chanrelay_protocol::{codec, Event};
//!
//! let event = codec::decode(r#"{"type":"message","channel":"C1","text":"hi"}"#).unwrap();
//! assert!(event.is_message());
//!
//! let encoded = codec::encode(&event).unwrap();
//! assert!(encoded.contains("\"channel\":\"C1\""));
//! ```

pub mod codec;
pub mod event;

pub use codec::{decode, encode, format_timestamp, timestamp_now, ProtocolError};
pub use event::{Event, MESSAGE_TYPE};
