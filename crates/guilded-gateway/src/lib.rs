//! Guilded gateway client: websocket connection management, frame codecs,
//! heartbeat, and event dispatch.
//!
//! The pipeline is `socket → codec → connection → decoder → handlers`:
//!
//! * [`socket`] opens and speaks the raw websocket,
//! * [`frame`] translates text frames to and from typed [`frame::Frame`]s
//!   for either protocol variant,
//! * [`connection`] owns the handshake, heartbeat, ordering, and
//!   reconnect-with-backoff state machine,
//! * [`dispatch`] parses payloads, writes the cache through, and fans
//!   events out to registered handlers.
//!
//! One [`connection::Connection`] per socket; legacy mode runs several
//! connections over one shared [`dispatch::EventDecoder`].

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod payload;
pub mod socket;

pub use connection::{Backoff, Connection, ConnectionState, GatewayConfig, GatewayMode};
pub use dispatch::{EventDecoder, EventHandler, HandlerRegistry, SYSTEM_USER_ID, WILDCARD, handler_fn};
pub use error::{GatewayError, GatewayResult};
pub use frame::{BotCodec, CodecError, Frame, FrameCodec, LegacyCodec, OutboundFrame};
pub use heartbeat::{Heartbeat, HeartbeatState};
pub use payload::Welcome;
pub use socket::{AuthStyle, GatewaySocket, SocketConnector, SocketMessage, WsConnector};
