//! The per-socket connection state machine.
//!
//! A [`Connection`] owns one logical gateway link: it connects, performs the
//! welcome handshake, drives the heartbeat, reads frames in order, and
//! reconnects with linear backoff when the link drops. The first connect is
//! fatal on failure (bad credentials should surface immediately); every
//! later drop retries forever until [`Connection::close`] is called.
//!
//! All teardown decisions are made in one place, the session loop. The
//! heartbeat task never tears the connection down itself; its frames flow
//! through the session loop's outbound channel, so a dead socket is
//! observed exactly once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use guilded_core::ClientEvent;

use crate::dispatch::EventDecoder;
use crate::error::{GatewayError, GatewayResult};
use crate::frame::{BotCodec, Frame, FrameCodec, LegacyCodec, OutboundFrame};
use crate::heartbeat::{Heartbeat, HeartbeatState};
use crate::payload::Welcome;
use crate::socket::{GatewaySocket, SocketConnector, SocketMessage};

/// Which wire protocol the connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Bot-account protocol: JSON `{op, t, d, s}` envelopes, websocket
    /// ping/pong heartbeat, resume cursor header.
    Bot,
    /// Legacy protocol: digit-prefixed frames, `"2"` text heartbeat, one
    /// socket per server.
    Legacy,
}

/// Tunables for a connection. The defaults match the public gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long to wait for the welcome frame before giving up on an
    /// attempt.
    pub handshake_timeout: Duration,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Added to the delay after every consecutive failure. The delay is
    /// uncapped; it resets after a successful handshake.
    pub backoff_increment: Duration,
    /// Overrides the server-dictated heartbeat interval when set.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(5),
            backoff_increment: Duration::from_secs(5),
            heartbeat_interval: None,
        }
    }
}

/// Linear, uncapped reconnect delay.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    increment: Duration,
    failures: u32,
}

impl Backoff {
    /// Creates a backoff starting at `base`, growing by `increment`.
    pub fn new(base: Duration, increment: Duration) -> Self {
        Self {
            base,
            increment,
            failures: 0,
        }
    }

    /// The delay before the next attempt. Each call counts as a failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base + self.increment * self.failures;
        self.failures += 1;
        delay
    }

    /// Resets after a successful handshake.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Observable connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// Opening the socket and awaiting the welcome frame.
    Handshaking,
    /// Handshake complete, frames flowing.
    Connected,
    /// The link dropped; retrying with backoff.
    Reconnecting,
}

/// Why a session ended.
enum SessionEnd {
    /// [`Connection::close`] was called.
    UserClosed,
    /// The socket dropped or errored; reconnect.
    Lost,
}

/// One logical gateway link.
///
/// Legacy mode opens one `Connection` per server, all sharing a decoder
/// (and through it the cache and handler registry).
pub struct Connection {
    mode: GatewayMode,
    codec: Arc<dyn FrameCodec>,
    connector: Arc<dyn SocketConnector>,
    decoder: Arc<EventDecoder>,
    config: GatewayConfig,
    heartbeat_state: Arc<HeartbeatState>,
    cancel: CancellationToken,
    state: RwLock<ConnectionState>,
    /// Last seen sequence marker, presented on reconnect for missed-message
    /// replay. Best effort: a rejected cursor is dropped, not retried.
    cursor: Mutex<Option<String>>,
    /// Sender into the live session's outbound queue, when one exists.
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
}

impl Connection {
    /// Creates a connection; nothing happens until [`Connection::run`].
    pub fn new(
        mode: GatewayMode,
        connector: Arc<dyn SocketConnector>,
        decoder: Arc<EventDecoder>,
        config: GatewayConfig,
    ) -> Self {
        let codec: Arc<dyn FrameCodec> = match mode {
            GatewayMode::Bot => Arc::new(BotCodec),
            GatewayMode::Legacy => Arc::new(LegacyCodec),
        };
        Self {
            mode,
            codec,
            connector,
            decoder,
            config,
            heartbeat_state: Arc::new(HeartbeatState::new()),
            cancel: CancellationToken::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            cursor: Mutex::new(None),
            outbound: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Seconds between the last heartbeat send and its acknowledgement;
    /// infinite before the first ack.
    pub fn latency(&self) -> f64 {
        self.heartbeat_state.latency()
    }

    /// The resume cursor that will be presented on the next reconnect.
    pub fn cursor(&self) -> Option<String> {
        self.cursor.lock().clone()
    }

    /// Requests shutdown. [`Connection::run`] returns soon after.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Encodes and queues an outbound dispatch on the live socket.
    pub async fn send_dispatch(&self, name: &str, payload: &Value) -> GatewayResult<()> {
        let frame = self
            .codec
            .encode_dispatch(name, payload)
            .map_err(|e| GatewayError::SendFailed(e.to_string()))?;
        let sender = self.outbound.lock().clone();
        match sender {
            Some(sender) => sender
                .send(frame)
                .await
                .map_err(|e| GatewayError::SendFailed(e.to_string())),
            None => Err(GatewayError::SendFailed("not connected".to_string())),
        }
    }

    /// Runs the connection until [`Connection::close`] or a fatal first
    /// connect failure.
    ///
    /// The first connect and handshake propagate their error so that bad
    /// credentials or an unreachable gateway surface immediately. Once a
    /// session has been established, every drop reconnects with backoff,
    /// forever.
    pub async fn run(&self) -> GatewayResult<()> {
        *self.state.write() = ConnectionState::Handshaking;
        let cursor = self.cursor();
        let mut socket = self.connector.connect(cursor.as_deref()).await?;
        let welcome = self.handshake(&mut socket).await?;
        let interval = self.heartbeat_interval(&welcome);
        self.after_welcome(welcome, false).await;

        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_increment);
        let mut session = (socket, interval);

        loop {
            let (socket, interval) = session;
            match self.run_session(socket, interval).await {
                SessionEnd::UserClosed => {
                    *self.state.write() = ConnectionState::Disconnected;
                    self.decoder.emit(ClientEvent::Disconnect).await;
                    return Ok(());
                }
                SessionEnd::Lost => {
                    *self.state.write() = ConnectionState::Reconnecting;
                    self.decoder.emit(ClientEvent::Disconnect).await;
                }
            }

            session = match self.reconnect(&mut backoff).await {
                Some(session) => session,
                None => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            };
        }
    }

    /// Retries connect + handshake until one succeeds or shutdown is
    /// requested. `None` means shutdown.
    async fn reconnect(
        &self,
        backoff: &mut Backoff,
    ) -> Option<(Box<dyn GatewaySocket>, Duration)> {
        loop {
            let delay = backoff.next_delay();
            info!(
                delay_secs = delay.as_secs_f64(),
                mode = ?self.mode,
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let cursor = self.cursor();
            match self.connector.connect(cursor.as_deref()).await {
                Ok(mut socket) => match self.handshake(&mut socket).await {
                    Ok(welcome) => {
                        backoff.reset();
                        let interval = self.heartbeat_interval(&welcome);
                        self.after_welcome(welcome, true).await;
                        return Some((socket, interval));
                    }
                    Err(e) => warn!(error = %e, "Handshake failed, retrying"),
                },
                Err(e) => warn!(error = %e, "Reconnect attempt failed"),
            }
        }
    }

    fn heartbeat_interval(&self, welcome: &Welcome) -> Duration {
        self.config
            .heartbeat_interval
            .unwrap_or(welcome.heartbeat_interval)
    }

    /// Awaits the welcome frame, bounded by the handshake timeout.
    async fn handshake(&self, socket: &mut Box<dyn GatewaySocket>) -> GatewayResult<Welcome> {
        *self.state.write() = ConnectionState::Handshaking;
        tokio::time::timeout(self.config.handshake_timeout, self.await_welcome(socket))
            .await
            .map_err(|_| GatewayError::HandshakeTimeout)?
    }

    async fn await_welcome(&self, socket: &mut Box<dyn GatewaySocket>) -> GatewayResult<Welcome> {
        // Open with one keep-alive per protocol so the server sees client
        // traffic before its hello.
        let opener = match self.codec.encode_heartbeat() {
            OutboundFrame::Text(text) => SocketMessage::Text(text),
            OutboundFrame::Ping => SocketMessage::Ping(Vec::new()),
        };
        socket.send(opener).await?;

        loop {
            let message = match socket.recv().await {
                None => return Err(GatewayError::Closed { code: None }),
                Some(Err(e)) => return Err(e),
                Some(Ok(message)) => message,
            };
            match message {
                SocketMessage::Text(text) => {
                    self.decoder
                        .emit(ClientEvent::SocketRawReceive { raw: text.clone() })
                        .await;
                    match self.codec.decode(&text) {
                        Ok(Frame::Welcome(welcome)) => return Ok(welcome),
                        Ok(Frame::InvalidCursor { message }) => {
                            // Stale cursor; the next attempt starts fresh.
                            self.cursor.lock().take();
                            return Err(GatewayError::HandshakeRejected { reason: message });
                        }
                        Ok(other) => debug!(frame = ?other, "Frame before welcome, ignoring"),
                        Err(e) => debug!(error = %e, "Undecodable frame before welcome"),
                    }
                }
                SocketMessage::Ping(data) => socket.send(SocketMessage::Pong(data)).await?,
                SocketMessage::Pong(_) => {}
                SocketMessage::Close(code) => return Err(GatewayError::Closed { code }),
            }
        }
    }

    /// Folds the welcome into state and announces the connection.
    ///
    /// The legacy hello carries no user, so `ready` is only emitted for the
    /// bot protocol; the legacy facade announces readiness itself once it
    /// has fetched the account profile.
    async fn after_welcome(&self, welcome: Welcome, reconnected: bool) {
        if let Some(id) = &welcome.last_message_id {
            *self.cursor.lock() = Some(id.clone());
        }
        *self.state.write() = ConnectionState::Connected;
        info!(
            mode = ?self.mode,
            session_id = welcome.session_id.as_deref().unwrap_or(""),
            reconnected,
            "Gateway connected"
        );

        if reconnected {
            self.decoder.emit(ClientEvent::Reconnect).await;
            return;
        }
        self.decoder.emit(ClientEvent::Connect).await;
        if let Some(user) = welcome.user {
            let slot = self.decoder.cache().upsert_user(user);
            self.decoder
                .emit(ClientEvent::Ready {
                    user: slot,
                    last_message_id: welcome.last_message_id,
                })
                .await;
        }
    }

    /// Drives one established session until the socket drops or shutdown is
    /// requested.
    ///
    /// Dispatches are awaited inline, so a slow handler backpressures the
    /// socket rather than reordering events.
    async fn run_session(&self, mut socket: Box<dyn GatewaySocket>, interval: Duration) -> SessionEnd {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);
        *self.outbound.lock() = Some(outbound_tx.clone());
        self.heartbeat_state.reset();
        let heartbeat = Heartbeat::spawn(
            interval,
            self.codec.encode_heartbeat(),
            outbound_tx,
            Arc::clone(&self.heartbeat_state),
        );

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = socket.close().await;
                    break SessionEnd::UserClosed;
                }
                frame = outbound_rx.recv() => {
                    // The channel only closes if the heartbeat task died.
                    let Some(frame) = frame else { break SessionEnd::Lost };
                    let message = match frame {
                        OutboundFrame::Text(text) => {
                            self.decoder
                                .emit(ClientEvent::SocketRawSend { raw: text.clone() })
                                .await;
                            SocketMessage::Text(text)
                        }
                        OutboundFrame::Ping => SocketMessage::Ping(Vec::new()),
                    };
                    if let Err(e) = socket.send(message).await {
                        warn!(error = %e, "Socket write failed");
                        break SessionEnd::Lost;
                    }
                }
                received = socket.recv() => {
                    match received {
                        None => {
                            info!("Socket stream ended");
                            break SessionEnd::Lost;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Socket read failed");
                            break SessionEnd::Lost;
                        }
                        Some(Ok(SocketMessage::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(SocketMessage::Ping(data))) => {
                            if socket.send(SocketMessage::Pong(data)).await.is_err() {
                                break SessionEnd::Lost;
                            }
                        }
                        Some(Ok(SocketMessage::Pong(_))) => self.heartbeat_state.record_ack(),
                        Some(Ok(SocketMessage::Close(code))) => {
                            info!(code = ?code, "Server closed the connection");
                            break SessionEnd::Lost;
                        }
                    }
                }
            }
        };

        self.outbound.lock().take();
        heartbeat.stop();
        end
    }

    async fn handle_text(&self, text: &str) {
        self.decoder
            .emit(ClientEvent::SocketRawReceive {
                raw: text.to_string(),
            })
            .await;

        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match frame {
            Frame::Welcome(_) => debug!("Welcome after handshake, ignoring"),
            Frame::Dispatch { name, seq, payload } => {
                // The cursor advances even for tags we do not recognize, so
                // a resume never replays frames we already walked past.
                if let Some(seq) = seq {
                    *self.cursor.lock() = Some(seq);
                }
                self.decoder.handle_dispatch(&name, payload).await;
            }
            Frame::Resumed => debug!("Missed-message replay complete"),
            Frame::HeartbeatAck => self.heartbeat_state.record_ack(),
            Frame::InvalidCursor { message } => {
                error!(%message, "Resume cursor rejected, dropping it");
                self.cursor.lock().take();
                self.decoder
                    .emit(ClientEvent::Error {
                        message: format!("resume cursor rejected: {message}"),
                    })
                    .await;
            }
            Frame::InternalError { message } => {
                error!(%message, "Gateway reported an internal error");
                self.decoder.emit(ClientEvent::Error { message }).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly_uncapped() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(5));
        let delays: Vec<u64> = (0..4).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 15, 20]);

        // Keeps growing well past any cap.
        for _ in 0..100 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(5 + 5 * 104));
    }

    #[test]
    fn test_backoff_resets_after_success() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(5));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(60));
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, None);
    }
}
