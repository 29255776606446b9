//! WebSocket halves of the realtime connection, using tokio-tungstenite.

use async_trait::async_trait;
use chanrelay_protocol::{codec, Event};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

use crate::traits::{EventSink, EventSource, TransportError};

/// Receiving half of a websocket.
pub struct WebSocketSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Sending half of a websocket.
pub struct WebSocketSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// Split an open websocket into its two halves.
pub fn split<S>(ws: WebSocketStream<S>) -> (WebSocketSource<S>, WebSocketSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WebSocketSource { stream }, WebSocketSink { sink })
}

/// Dial `url` and split the resulting websocket.
///
/// # Errors
///
/// Returns [`TransportError::Connect`] if the websocket handshake fails.
pub async fn dial(
    url: &str,
) -> Result<
    (
        WebSocketSource<MaybeTlsStream<TcpStream>>,
        WebSocketSink<MaybeTlsStream<TcpStream>>,
    ),
    TransportError,
> {
    let (ws, response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    debug!(status = %response.status(), "WebSocket handshake completed");
    Ok(split(ws))
}

#[async_trait]
impl<S> EventSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Event>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return codec::decode(&text).map(Some).map_err(TransportError::from);
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Received close frame");
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    // Pings are answered by tungstenite itself.
                    trace!(len = other.len(), "Skipping non-text frame");
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl<S> EventSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, event: &Event) -> Result<(), TransportError> {
        let text = codec::encode(event)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => {
                    TransportError::ConnectionClosed
                }
                other => TransportError::SendFailed(other.to_string()),
            })
    }
}
