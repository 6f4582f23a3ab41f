//! # Guilded Core
//!
//! Shared foundation for the Guilded client library.
//!
//! This crate holds everything the gateway and the facade client have in
//! common:
//!
//! - **Entity model**: typed wire-schema structs ([`Server`], [`Channel`],
//!   [`Member`], [`User`], [`Role`], [`Message`], [`Emote`]) that mirror the
//!   JSON the API sends.
//! - **Entity cache**: the single id-keyed store the event decoder reads and
//!   writes ([`EntityCache`]). Cache slots are [`Shared`] handles, so an
//!   object held by user code observes later updates in place.
//! - **Client events**: the typed [`ClientEvent`] values delivered to
//!   registered handlers.
//! - **Resource client seam**: the [`ResourceClient`] trait the decoder uses
//!   for best-effort REST lookups when an event references an entity that is
//!   not cached yet.

pub mod cache;
pub mod entity;
pub mod error;
pub mod event;
pub mod resource;

pub use cache::{EntityCache, Shared, shared};
pub use entity::{
    Channel, ChannelKind, Emote, Member, Message, Reaction, Role, Server, User, Webhook,
};
pub use error::{ResourceError, ResourceResult};
pub use event::{ClientEvent, MemberRemoveKind, MemberRolesUpdate};
pub use resource::{NoopResourceClient, ResourceClient};
