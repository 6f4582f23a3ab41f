//! The socket seam and its tokio-tungstenite implementation.
//!
//! The connection state machine talks to [`GatewaySocket`] and obtains new
//! sockets from a [`SocketConnector`], so the whole lifecycle is testable
//! against an in-memory socket. [`WsConnector`] is the production
//! implementation; it attaches the auth header and, on reconnects, the
//! `guilded-last-message-id` resume header.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{GatewayError, GatewayResult};

/// Header carrying the resume cursor on reconnect.
const RESUME_HEADER: &str = "guilded-last-message-id";

/// A message crossing the socket, reduced to what the gateway cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketMessage {
    /// A text frame.
    Text(String),
    /// A ping control frame (the peer expects a pong).
    Ping(Vec<u8>),
    /// A pong control frame (heartbeat ack in the bot protocol).
    Pong(Vec<u8>),
    /// The peer closed the connection.
    Close(Option<u16>),
}

/// One live socket.
#[async_trait]
pub trait GatewaySocket: Send {
    /// Writes a message to the socket.
    async fn send(&mut self, message: SocketMessage) -> GatewayResult<()>;

    /// Reads the next message. `None` means the stream ended.
    async fn recv(&mut self) -> Option<GatewayResult<SocketMessage>>;

    /// Performs a graceful close.
    async fn close(&mut self) -> GatewayResult<()>;
}

/// Factory for sockets, invoked on every (re)connect attempt.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Opens a new socket, presenting `cursor` for resumption when set.
    async fn connect(&self, cursor: Option<&str>) -> GatewayResult<Box<dyn GatewaySocket>>;
}

// ===========================================================================
// tokio-tungstenite implementation
// ===========================================================================

/// How the connector authenticates with the gateway.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    /// `Authorization: Bearer <token>` (bot protocol).
    Bearer(String),
    /// `cookie: <session cookie>` (legacy protocol).
    Cookie(String),
    /// No credentials attached.
    None,
}

/// Production [`SocketConnector`] over tokio-tungstenite.
pub struct WsConnector {
    url: String,
    auth: AuthStyle,
    user_agent: String,
}

impl WsConnector {
    /// Creates a connector for `url` with the given credentials.
    pub fn new(url: impl Into<String>, auth: AuthStyle, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth,
            user_agent: user_agent.into(),
        }
    }

    fn request(&self, cursor: Option<&str>) -> GatewayResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request =
            self.url
                .as_str()
                .into_client_request()
                .map_err(|e| GatewayError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;

        let headers = request.headers_mut();
        let mut insert = |name: &'static str, value: &str| -> GatewayResult<()> {
            let value = value.parse().map_err(|_| GatewayError::ConnectionFailed {
                url: self.url.clone(),
                reason: format!("invalid header value for {name}"),
            })?;
            headers.insert(name, value);
            Ok(())
        };

        insert("user-agent", &self.user_agent)?;
        match &self.auth {
            AuthStyle::Bearer(token) => insert("authorization", &format!("Bearer {token}"))?,
            AuthStyle::Cookie(cookie) => insert("cookie", cookie)?,
            AuthStyle::None => {}
        }
        if let Some(cursor) = cursor {
            // We have connected before; ask to catch up with missed events.
            insert(RESUME_HEADER, cursor)?;
        }

        Ok(request)
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, cursor: Option<&str>) -> GatewayResult<Box<dyn GatewaySocket>> {
        let request = self.request(cursor)?;
        debug!(url = %self.url, resuming = cursor.is_some(), "Connecting to the gateway");

        let (stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| GatewayError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;

        Ok(Box::new(WsSocket { stream }))
    }
}

/// A live tokio-tungstenite socket.
pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewaySocket for WsSocket {
    async fn send(&mut self, message: SocketMessage) -> GatewayResult<()> {
        let frame = match message {
            SocketMessage::Text(text) => Message::text(text),
            SocketMessage::Ping(data) => Message::Ping(data.into()),
            SocketMessage::Pong(data) => Message::Pong(data.into()),
            SocketMessage::Close(_) => return self.close().await,
        };
        self.stream
            .send(frame)
            .await
            .map_err(|e| GatewayError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<GatewayResult<SocketMessage>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(GatewayError::Io(e.to_string()))),
            };

            let mapped = match message {
                Message::Text(text) => SocketMessage::Text(text.as_str().to_owned()),
                Message::Binary(data) => {
                    SocketMessage::Text(String::from_utf8_lossy(&data).into_owned())
                }
                Message::Ping(data) => SocketMessage::Ping(data.to_vec()),
                Message::Pong(data) => SocketMessage::Pong(data.to_vec()),
                Message::Close(frame) => {
                    SocketMessage::Close(frame.map(|f| u16::from(f.code)))
                }
                // Raw frames only appear when manually enabled; skip.
                Message::Frame(_) => {
                    trace!("Skipping raw websocket frame");
                    continue;
                }
            };
            return Some(Ok(mapped));
        }
    }

    async fn close(&mut self) -> GatewayResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| GatewayError::Io(e.to_string()))
    }
}
