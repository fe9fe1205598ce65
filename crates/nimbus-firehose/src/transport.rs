//! Pluggable WebSocket transport.
//!
//! Platforms supply their own transport; the default is
//! `tokio-tungstenite`. Pings are answered inside the transport so the
//! event layer only ever sees binary and text messages.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

use nimbus_common::{Error, Result};

/// A message from the socket, as the event layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// A binary frame.
    Binary(Vec<u8>),
    /// A text frame (ignored by the firehose).
    Text(String),
}

/// An open WebSocket connection.
#[async_trait]
pub trait WebSocketConnection: Send {
    /// Receives the next message; `None` signals a clean close.
    async fn receive(&mut self) -> Result<Option<WsMessage>>;

    /// Closes the connection with a normal-closure code.
    async fn close(&mut self) -> Result<()>;
}

/// The capability to open WebSocket connections.
#[async_trait]
pub trait WebSocketTransport: Send + Sync {
    /// Connects to a `ws://` or `wss://` URL.
    async fn connect(&self, url: &str) -> Result<Box<dyn WebSocketConnection>>;
}

/// The default transport, backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    /// Creates the default transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TungsteniteConnection {
    stream: WsStream,
}

#[async_trait]
impl WebSocketTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn WebSocketConnection>> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

#[async_trait]
impl WebSocketConnection for TungsteniteConnection {
    async fn receive(&mut self) -> Result<Option<WsMessage>> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };

            match message.map_err(|e| Error::Network(e.to_string()))? {
                Message::Binary(data) => return Ok(Some(WsMessage::Binary(data))),
                Message::Text(text) => return Ok(Some(WsMessage::Text(text))),
                Message::Ping(data) => {
                    trace!("answering ping");
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| Error::Network(e.to_string()))?;
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(_) => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            }))
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }
}
