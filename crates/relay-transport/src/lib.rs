//! # chanrelay-transport
//!
//! The single realtime connection chanrelay uses to receive and send chat
//! messages.
//!
//! Connecting is a two-step handshake: the Web API hands out a session
//! websocket URL, then the websocket is dialed. The socket is split into an
//! [`EventSource`] and an [`EventSink`], each driven by its own task:
//!
//! ```text
//!  socket ──▶ receive task ──▶ incoming conduit ──▶ (router)
//!  socket ◀── send task    ◀── outgoing conduit ◀── (router)
//! ```
//!
//! ```rust,ignore
//! use chanrelay_transport::ConnectionManager;
//!
//! let manager = ConnectionManager::new("https://slack.com/api");
//! let conn = manager.connect(&token).await?;
//! router.run(conn.incoming, conn.outgoing).await;
//! ```

pub mod manager;
pub mod session;
pub mod traits;
pub mod websocket;

pub use manager::{ConnectionManager, ConnectionTasks, RealtimeConnection};
pub use session::SessionClient;
pub use traits::{EventSink, EventSource, TransportError};
pub use websocket::{WebSocketSink, WebSocketSource};
