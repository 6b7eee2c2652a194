// Push socket over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{PushConnector, PushSink, PushStream};
use crate::error::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn PushSink>, Box<dyn PushStream>), TransportError> {
        // Refused connections and rejected upgrades are both retryable.
        let (socket, response) =
            connect_async(url).await.map_err(|error| TransportError::Handshake(error.to_string()))?;
        debug!(url, status = %response.status(), "push socket upgraded");

        let (sink, stream) = socket.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsStream { stream })))
    }
}

struct WsSink {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl PushSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.sink.send(Message::Text(frame.into())).await.map_err(socket_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(socket_error(error)),
        }
    }
}

struct WsStream {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl PushStream for WsStream {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(next) = self.stream.next().await else {
                return Ok(None);
            };
            match next {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(_)) => return Ok(None),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(None),
                Err(error) => return Err(socket_error(error)),
            }
        }
    }
}

fn socket_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}
