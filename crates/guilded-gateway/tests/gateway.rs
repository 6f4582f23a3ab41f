//! End-to-end connection tests over an in-memory socket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use guilded_core::{ClientEvent, EntityCache, NoopResourceClient};
use guilded_gateway::{
    Connection, EventDecoder, GatewayConfig, GatewayError, GatewayMode, GatewayResult,
    GatewaySocket, HandlerRegistry, SocketConnector, SocketMessage, handler_fn,
};

struct MockSocket {
    incoming: mpsc::UnboundedReceiver<SocketMessage>,
    sent: mpsc::UnboundedSender<SocketMessage>,
}

#[async_trait]
impl GatewaySocket for MockSocket {
    async fn send(&mut self, message: SocketMessage) -> GatewayResult<()> {
        self.sent
            .send(message)
            .map_err(|e| GatewayError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<GatewayResult<SocketMessage>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> GatewayResult<()> {
        Ok(())
    }
}

/// Hands out pre-built sockets and records the cursor presented at each
/// connect.
struct MockConnector {
    sockets: Mutex<VecDeque<MockSocket>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl MockConnector {
    fn new(sockets: Vec<MockSocket>) -> Self {
        Self {
            sockets: Mutex::new(sockets.into()),
            cursors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SocketConnector for MockConnector {
    async fn connect(&self, cursor: Option<&str>) -> GatewayResult<Box<dyn GatewaySocket>> {
        self.cursors.lock().push(cursor.map(str::to_string));
        match self.sockets.lock().pop_front() {
            Some(socket) => Ok(Box::new(socket)),
            None => Err(GatewayError::ConnectionFailed {
                url: "mock".to_string(),
                reason: "no socket available".to_string(),
            }),
        }
    }
}

fn mock_socket() -> (
    MockSocket,
    mpsc::UnboundedSender<SocketMessage>,
    mpsc::UnboundedReceiver<SocketMessage>,
) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let socket = MockSocket {
        incoming: in_rx,
        sent: out_tx,
    };
    (socket, in_tx, out_rx)
}

struct Harness {
    cache: Arc<EntityCache>,
    registry: Arc<HandlerRegistry>,
    connection: Arc<Connection>,
}

fn harness(connector: Arc<MockConnector>, config: GatewayConfig) -> Harness {
    let cache = Arc::new(EntityCache::default());
    let registry = Arc::new(HandlerRegistry::new());
    let decoder = Arc::new(EventDecoder::new(
        Arc::clone(&cache),
        Arc::new(NoopResourceClient),
        Arc::clone(&registry),
    ));
    let connection = Arc::new(Connection::new(
        GatewayMode::Bot,
        connector,
        decoder,
        config,
    ));
    Harness {
        cache,
        registry,
        connection,
    }
}

/// Subscribes to `name` and returns a receiver of delivered events.
fn subscribe(
    registry: &HandlerRegistry,
    name: &str,
) -> mpsc::UnboundedReceiver<ClientEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.on(
        name,
        handler_fn(move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event).ok();
                Ok(())
            }
        }),
    );
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within two seconds")
        .expect("event channel open")
}

fn welcome_frame(last_message_id: Option<&str>) -> SocketMessage {
    let mut d = json!({
        "heartbeatIntervalMs": 25000.0,
        "user": {"id": "B1", "name": "testbot", "type": "bot"}
    });
    if let Some(id) = last_message_id {
        d["lastMessageId"] = json!(id);
    }
    SocketMessage::Text(json!({"op": 1, "d": d}).to_string())
}

#[tokio::test]
async fn test_welcome_then_dispatch_reaches_handler() {
    let (socket, in_tx, mut out_rx) = mock_socket();
    let connector = Arc::new(MockConnector::new(vec![socket]));
    let h = harness(Arc::clone(&connector), GatewayConfig::default());
    let mut ready = subscribe(&h.registry, "ready");
    let mut messages = subscribe(&h.registry, "message");

    in_tx.send(welcome_frame(Some("abc"))).unwrap();
    in_tx
        .send(SocketMessage::Text(
            json!({
                "op": 0,
                "s": "1",
                "t": "ChatMessageCreated",
                "d": {
                    "serverId": "S1",
                    "message": {
                        "id": "M1",
                        "channelId": "C1",
                        "createdBy": "U1",
                        "content": "hello"
                    }
                }
            })
            .to_string(),
        ))
        .unwrap();

    let runner = tokio::spawn({
        let connection = Arc::clone(&h.connection);
        async move { connection.run().await }
    });

    match next_event(&mut ready).await {
        ClientEvent::Ready {
            user,
            last_message_id,
        } => {
            assert_eq!(user.read().id, "B1");
            assert_eq!(last_message_id.as_deref(), Some("abc"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    match next_event(&mut messages).await {
        ClientEvent::Message(message) => assert_eq!(message.read().id, "M1"),
        other => panic!("unexpected event {other:?}"),
    }

    // The dispatch advanced the resume cursor past the welcome's value.
    assert_eq!(h.connection.cursor().as_deref(), Some("1"));
    assert!(h.cache.message("M1").is_some());
    assert!(h.cache.user("B1").is_some());

    // The first outbound frame was the handshake keep-alive.
    let opener = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("opener within two seconds")
        .expect("socket open");
    assert_eq!(opener, SocketMessage::Ping(Vec::new()));

    // Server-initiated ping is answered with a matching pong.
    in_tx.send(SocketMessage::Ping(vec![7])).unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("pong within two seconds")
        .expect("socket open");
    assert_eq!(reply, SocketMessage::Pong(vec![7]));

    h.connection.close();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("run returns after close")
        .expect("task joins")
        .expect("clean shutdown");
}

#[tokio::test]
async fn test_reconnect_presents_resume_cursor() {
    let (first, first_tx, _first_out) = mock_socket();
    let (second, second_tx, _second_out) = mock_socket();
    let connector = Arc::new(MockConnector::new(vec![first, second]));
    let config = GatewayConfig {
        backoff_base: Duration::from_millis(10),
        backoff_increment: Duration::from_millis(10),
        ..GatewayConfig::default()
    };
    let h = harness(Arc::clone(&connector), config);
    let mut disconnects = subscribe(&h.registry, "disconnect");
    let mut reconnects = subscribe(&h.registry, "reconnect");

    first_tx.send(welcome_frame(Some("abc"))).unwrap();
    let runner = tokio::spawn({
        let connection = Arc::clone(&h.connection);
        async move { connection.run().await }
    });

    // Give the first session its welcome, then kill the socket.
    second_tx.send(welcome_frame(None)).unwrap();
    drop(first_tx);

    assert!(matches!(
        next_event(&mut disconnects).await,
        ClientEvent::Disconnect
    ));
    assert!(matches!(
        next_event(&mut reconnects).await,
        ClientEvent::Reconnect
    ));

    // First connect had nothing to resume from; the reconnect presented
    // the cursor from the first welcome.
    let cursors = connector.cursors.lock().clone();
    assert_eq!(cursors, vec![None, Some("abc".to_string())]);

    h.connection.close();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("run returns after close")
        .expect("task joins")
        .expect("clean shutdown");
}

#[tokio::test]
async fn test_first_connect_failure_is_fatal() {
    let connector = Arc::new(MockConnector::new(Vec::new()));
    let h = harness(connector, GatewayConfig::default());

    let result = h.connection.run().await;
    assert!(matches!(
        result,
        Err(GatewayError::ConnectionFailed { .. })
    ));
}
