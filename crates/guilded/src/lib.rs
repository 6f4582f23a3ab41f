//! High-level Guilded chat client.
//!
//! Wires the pieces of the stack together: the entity cache and typed
//! events from `guilded-core`, the websocket connection machinery from
//! `guilded-gateway`, and a REST client that backs cache misses.
//!
//! ```no_run
//! use guilded::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     guilded::logging::init();
//!     let client = Client::new(ClientConfig::from_env())?;
//!     client.on("message", |event| async move {
//!         if let ClientEvent::Message(message) = event {
//!             println!("{:?}", message.read().content);
//!         }
//!         Ok(())
//!     });
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod logging;
pub mod rest;

pub use client::{Client, ClientConfig, DEFAULT_GATEWAY_URL, TOKEN_ENV};
pub use rest::{DEFAULT_API_BASE, RestClient};

pub use guilded_core::{
    ClientEvent, EntityCache, MemberRemoveKind, MemberRolesUpdate, ResourceClient, ResourceError,
    Shared, entity,
};
pub use guilded_gateway::{
    ConnectionState, GatewayConfig, GatewayError, GatewayMode, WILDCARD,
};

/// The usual imports for a bot binary.
pub mod prelude {
    pub use crate::{Client, ClientConfig, ClientEvent, GatewayMode, Shared, WILDCARD};
    pub use guilded_core::entity::{Channel, Member, Message, Server, User};
}
