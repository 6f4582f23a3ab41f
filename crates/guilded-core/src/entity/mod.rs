//! Typed entity model mirroring the Guilded wire schema.
//!
//! Every struct here deserializes directly from the JSON objects the API
//! sends (camelCase keys, most fields optional). Entities that live in the
//! [`EntityCache`](crate::EntityCache) carry an `update` method that
//! overwrites fields in place, so that cache slots can be mutated without
//! replacing the shared handle other code may hold.
//!
//! Timestamps are kept as the ISO-8601 strings the API sends; the library
//! does not impose a datetime type on callers.

mod channel;
mod message;
mod server;
mod user;

pub use channel::{Channel, ChannelKind};
pub use message::{Emote, Message, Reaction, Webhook};
pub use server::{Member, Role, Server};
pub use user::User;
