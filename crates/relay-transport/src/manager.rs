//! Connection manager: owns the realtime connection and its two loops.
//!
//! The receive task reads one event at a time from the socket and hands it to
//! the incoming conduit; the send task takes one message at a time from the
//! outgoing conduit, stamps it and writes it to the socket. Both handoffs are
//! rendezvous, so a stalled consumer stops the socket from being drained.

use chanrelay_core::conduit::{self, ConduitReceiver, ConduitSender};
use chanrelay_core::Message;
use chanrelay_protocol::{codec, Event};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::SessionClient;
use crate::traits::{EventSink, EventSource, TransportError};
use crate::websocket;

/// Establishes realtime connections.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    session: SessionClient,
}

impl ConnectionManager {
    /// Create a manager for the Web API rooted at `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            session: SessionClient::new(api_base),
        }
    }

    /// Start a session with `token`, dial its websocket and spawn the
    /// receive and send tasks.
    ///
    /// There is no retry: a failure here is meant to end the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the session handshake or the websocket dial fails.
    pub async fn connect(&self, token: &str) -> Result<RealtimeConnection, TransportError> {
        let url = self.session.start(token).await?;
        debug!(url = %url, "Dialing realtime socket");

        let (source, sink) = websocket::dial(&url).await?;
        info!("Realtime connection established");

        Ok(Self::spawn(source, sink))
    }

    /// Spawn the receive and send tasks over an already open connection.
    pub fn spawn<S, K>(source: S, sink: K) -> RealtimeConnection
    where
        S: EventSource + 'static,
        K: EventSink + 'static,
    {
        let (incoming_tx, incoming) = conduit::channel();
        let (outgoing, outgoing_rx) = conduit::channel();

        let receiver = tokio::spawn(receive_loop(source, incoming_tx));
        let sender = tokio::spawn(send_loop(sink, outgoing_rx));

        RealtimeConnection {
            incoming,
            outgoing,
            tasks: ConnectionTasks { receiver, sender },
        }
    }
}

/// A live realtime connection.
#[derive(Debug)]
pub struct RealtimeConnection {
    /// Messages read from the socket.
    pub incoming: ConduitReceiver<Message>,
    /// Messages to write to the socket.
    pub outgoing: ConduitSender<Message>,
    /// The tasks driving the socket.
    pub tasks: ConnectionTasks,
}

/// Handles of the receive and send tasks.
#[derive(Debug)]
pub struct ConnectionTasks {
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl ConnectionTasks {
    /// Whether the receive task has ended (socket closed or conduit dropped).
    #[must_use]
    pub fn is_receiver_finished(&self) -> bool {
        self.receiver.is_finished()
    }

    /// Stop both tasks.
    pub fn abort(&self) {
        self.receiver.abort();
        self.sender.abort();
    }
}

async fn receive_loop<S: EventSource>(mut source: S, incoming: ConduitSender<Message>) {
    loop {
        match source.recv().await {
            Ok(Some(event)) => {
                debug!(kind = %event.kind, channel = %event.channel, "Received event");
                if incoming.send(Message::from(event)).await.is_err() {
                    debug!("Incoming conduit closed, stopping receive loop");
                    return;
                }
            }
            Ok(None) => {
                warn!("Realtime connection closed by peer");
                return;
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Failed to decode event");
            }
            Err(e) => {
                warn!(error = %e, "Realtime connection lost");
                return;
            }
        }
    }
}

async fn send_loop<K: EventSink>(mut sink: K, mut outgoing: ConduitReceiver<Message>) {
    let mut next_id: u64 = 1;

    while let Some(message) = outgoing.recv().await {
        let mut event = Event::from(message);
        event.id = Some(next_id);
        event.ts = Some(codec::timestamp_now());
        next_id += 1;

        debug!(channel = %event.channel, id = next_id - 1, "Sending message");

        if let Err(e) = sink.send(&event).await {
            warn!(channel = %event.channel, error = %e, "Failed to send message, dropping it");
        }
    }

    debug!("Outgoing conduit closed, stopping send loop");
}
