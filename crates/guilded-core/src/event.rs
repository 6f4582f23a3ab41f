//! Typed events delivered to registered handlers.
//!
//! Every gateway dispatch that the decoder recognizes becomes one of these
//! variants. Entities that live in the cache are passed as [`Shared`]
//! handles; `before` values in before/after pairs are owned snapshots taken
//! just before the in-place update.

use crate::cache::Shared;
use crate::entity::{Channel, Member, Message, Reaction, User, Webhook};

/// Why a member left a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRemoveKind {
    /// The member left on their own.
    Leave,
    /// The member was kicked.
    Kick,
    /// The member was banned.
    Ban,
}

/// One member's role set change within a `ServerRolesUpdated` dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRolesUpdate {
    /// The affected member's user id.
    pub user_id: String,
    /// Role ids before the update, if the member was cached.
    pub before_role_ids: Option<Vec<u64>>,
    /// Role ids after the update.
    pub role_ids: Vec<u64>,
}

/// An event produced by the gateway and fanned out to handlers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The welcome handshake completed and the client identity is known.
    Ready {
        /// The connected account's own profile.
        user: Shared<User>,
        /// The resume cursor handed out at welcome.
        last_message_id: Option<String>,
    },
    /// The socket connected (first connect only; reconnects fire
    /// [`ClientEvent::Reconnect`]).
    Connect,
    /// The socket dropped; reconnection with backoff is starting.
    Disconnect,
    /// A reconnect attempt succeeded and the connection is live again.
    Reconnect,

    /// A message was sent.
    Message(Shared<Message>),
    /// A cached message was edited.
    MessageUpdate {
        /// Snapshot taken before the cache slot was overwritten.
        before: Message,
        /// The updated, still-cached message.
        after: Shared<Message>,
    },
    /// A cached message was deleted.
    MessageDelete {
        /// The removed message with `deleted_at` stamped.
        message: Message,
    },

    /// A member joined a server.
    MemberJoin(Shared<Member>),
    /// A member left, was kicked from, or was banned from a server.
    MemberRemove {
        /// The removed member (a snapshot, or a stub if never cached).
        member: Member,
        /// Leave, kick, or ban.
        kind: MemberRemoveKind,
    },
    /// A cached member's profile changed.
    MemberUpdate {
        /// Snapshot taken before the in-place update.
        before: Member,
        /// The updated, still-cached member.
        after: Shared<Member>,
    },
    /// A server's roles, or members' role sets, changed in bulk.
    BulkMemberRolesUpdate {
        /// The affected server.
        server_id: String,
        /// Per-member role set changes.
        updates: Vec<MemberRolesUpdate>,
    },

    /// A channel was created.
    ChannelCreate(Shared<Channel>),
    /// A cached channel changed.
    ChannelUpdate {
        /// Snapshot taken before the in-place update.
        before: Channel,
        /// The updated, still-cached channel.
        after: Shared<Channel>,
    },
    /// A channel was deleted.
    ChannelDelete {
        /// The removed channel (a snapshot, or payload-built if uncached).
        channel: Channel,
    },

    /// A reaction was added to a message.
    ReactionAdd(Reaction),
    /// A reaction was removed from a message.
    ReactionRemove(Reaction),

    /// A user started typing in a channel. There is no stop-typing event.
    Typing {
        /// The channel being typed in.
        channel_id: String,
        /// The typing user.
        user_id: String,
    },

    /// A webhook was created.
    WebhookCreate(Webhook),
    /// A webhook was updated (webhooks are not cached, so there is no
    /// before/after pair).
    WebhookUpdate(Webhook),

    /// A handler raised an error, or the gateway hit a recoverable fault.
    Error {
        /// Human-readable description.
        message: String,
    },

    /// Diagnostic passthrough of every inbound text frame.
    SocketRawReceive {
        /// The raw frame text.
        raw: String,
    },
    /// Diagnostic passthrough of every outbound text frame.
    SocketRawSend {
        /// The raw frame text.
        raw: String,
    },
}

impl ClientEvent {
    /// The primary subscription name handlers register under.
    ///
    /// [`MemberRemove`](ClientEvent::MemberRemove) additionally dispatches
    /// under `member_leave` / `member_kick` / `member_ban` depending on its
    /// kind; see [`ClientEvent::extra_names`].
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Ready { .. } => "ready",
            ClientEvent::Connect => "connect",
            ClientEvent::Disconnect => "disconnect",
            ClientEvent::Reconnect => "reconnect",
            ClientEvent::Message(_) => "message",
            ClientEvent::MessageUpdate { .. } => "message_update",
            ClientEvent::MessageDelete { .. } => "message_delete",
            ClientEvent::MemberJoin(_) => "member_join",
            ClientEvent::MemberRemove { .. } => "member_remove",
            ClientEvent::MemberUpdate { .. } => "member_update",
            ClientEvent::BulkMemberRolesUpdate { .. } => "bulk_member_roles_update",
            ClientEvent::ChannelCreate(_) => "channel_create",
            ClientEvent::ChannelUpdate { .. } => "channel_update",
            ClientEvent::ChannelDelete { .. } => "channel_delete",
            ClientEvent::ReactionAdd(_) => "reaction_add",
            ClientEvent::ReactionRemove(_) => "reaction_remove",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::WebhookCreate(_) => "webhook_create",
            ClientEvent::WebhookUpdate(_) => "webhook_update",
            ClientEvent::Error { .. } => "error",
            ClientEvent::SocketRawReceive { .. } => "socket_raw_receive",
            ClientEvent::SocketRawSend { .. } => "socket_raw_send",
        }
    }

    /// Additional subscription names this event also dispatches under.
    pub fn extra_names(&self) -> &'static [&'static str] {
        match self {
            ClientEvent::MemberRemove { kind, .. } => match kind {
                MemberRemoveKind::Leave => &["member_leave"],
                MemberRemoveKind::Kick => &["member_kick"],
                MemberRemoveKind::Ban => &["member_ban"],
            },
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::shared;

    #[test]
    fn test_event_names() {
        let event = ClientEvent::Message(shared(Message::default()));
        assert_eq!(event.name(), "message");
        assert!(event.extra_names().is_empty());

        let event = ClientEvent::MemberRemove {
            member: Member::stub("S1", "U1"),
            kind: MemberRemoveKind::Ban,
        };
        assert_eq!(event.name(), "member_remove");
        assert_eq!(event.extra_names(), &["member_ban"]);
    }
}
