//! Typed schemas for handshake and dispatch payloads.
//!
//! Dispatch payloads arrive as loose JSON; each recognized event tag has a
//! struct here that the decoder parses the payload into before touching the
//! cache. Unknown keys are ignored, absent optional keys default, so newer
//! server-side fields never break decoding.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use guilded_core::entity::{Channel, Member, Message, Reaction, User, Webhook};

use crate::frame::CodecError;

// ===========================================================================
// Handshake
// ===========================================================================

/// The normalized hello payload from either protocol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Welcome {
    /// Server-dictated heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Resume cursor handed out at welcome (bot protocol).
    pub last_message_id: Option<String>,
    /// The connected account's own profile (bot protocol).
    pub user: Option<User>,
    /// Session id (legacy protocol).
    pub session_id: Option<String>,
    /// Offered transport upgrades (legacy protocol).
    pub upgrades: Vec<String>,
}

/// Bot-protocol welcome: `{heartbeatIntervalMs, lastMessageId, user}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotHello {
    heartbeat_interval_ms: f64,
    #[serde(default)]
    last_message_id: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

/// Legacy hello: `{sid, upgrades, pingInterval}`. `pingInterval` is sent in
/// milliseconds; the heartbeat driver works in seconds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyHello {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    upgrades: Vec<String>,
    #[serde(default = "default_ping_interval_ms")]
    ping_interval: f64,
}

fn default_ping_interval_ms() -> f64 {
    25_000.0
}

impl Welcome {
    /// Parses the bot-protocol hello `d` payload.
    pub fn from_bot_hello(data: Value) -> Result<Self, CodecError> {
        let hello: BotHello = serde_json::from_value(data)?;
        Ok(Self {
            heartbeat_interval: Duration::from_secs_f64(hello.heartbeat_interval_ms / 1000.0),
            last_message_id: hello.last_message_id,
            user: hello.user,
            session_id: None,
            upgrades: Vec::new(),
        })
    }

    /// Parses the legacy hello object.
    pub fn from_legacy_hello(data: Value) -> Result<Self, CodecError> {
        let hello: LegacyHello = serde_json::from_value(data)?;
        Ok(Self {
            heartbeat_interval: Duration::from_secs_f64(hello.ping_interval / 1000.0),
            last_message_id: None,
            user: None,
            session_id: hello.sid,
            upgrades: hello.upgrades,
        })
    }
}

// ===========================================================================
// Dispatch payloads
// ===========================================================================

/// `ChatMessageCreated` / `ChatMessageUpdated` / `ChatMessageDeleted`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// The owning server; absent for DMs.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The message object. For deletes this is only `{id, channelId,
    /// serverId, deletedAt, isPrivate}`.
    pub message: Message,
}

/// `ServerMemberJoined`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberJoinedPayload {
    /// The joined server.
    pub server_id: String,
    /// The new member, user object nested.
    pub member: Member,
    /// Member count after the join, when the server sends it.
    #[serde(default)]
    pub server_member_count: Option<u64>,
}

/// `ServerMemberRemoved`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemovedPayload {
    /// The affected server.
    pub server_id: String,
    /// The removed member's user id.
    pub user_id: String,
    /// Whether the removal was a kick.
    #[serde(default)]
    pub is_kick: bool,
    /// Whether the removal was a ban.
    #[serde(default)]
    pub is_ban: bool,
}

/// The `userInfo` delta inside `ServerMemberUpdated`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUserInfo {
    /// The affected user id (older payloads put it here instead of at the
    /// top level).
    #[serde(default)]
    pub id: Option<String>,
    /// The new nickname; `null` means cleared.
    #[serde(default)]
    pub nickname: Option<String>,
}

/// `ServerMemberUpdated`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdatedPayload {
    /// The affected server.
    pub server_id: String,
    /// The affected user id, when sent at the top level.
    #[serde(default)]
    pub user_id: Option<String>,
    /// The changed fields.
    pub user_info: MemberUserInfo,
}

impl MemberUpdatedPayload {
    /// The affected user id, wherever the payload put it.
    pub fn member_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.user_info.id.as_deref())
    }
}

/// One entry of `memberRoleIds` in `ServerRolesUpdated`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRoleIds {
    /// The affected member's user id.
    pub user_id: String,
    /// The member's full role set after the update.
    pub role_ids: Vec<u64>,
}

/// `ServerRolesUpdated`.
///
/// Carries per-member role sets, the server's full rebuilt role list, or
/// both.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesUpdatedPayload {
    /// The affected server.
    pub server_id: String,
    /// Per-member role set changes.
    #[serde(default)]
    pub member_role_ids: Vec<MemberRoleIds>,
    /// The full role list keyed by role id. Includes a duplicate
    /// `"baseRole"` key that must be skipped.
    #[serde(default)]
    pub roles_by_id: serde_json::Map<String, Value>,
}

/// `ServerChannelCreated` / `Updated` / `Deleted`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload {
    /// The owning server.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The channel object.
    pub channel: Channel,
}

/// `ChannelMessageReactionCreated` / `Deleted`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    /// The owning server.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The reaction object.
    pub reaction: Reaction,
}

/// `ChatChannelTyping`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// The channel being typed in.
    pub channel_id: String,
    /// The typing user.
    pub user_id: String,
}

/// `ServerWebhookCreated` / `Updated`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// The owning server.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The webhook object.
    pub webhook: Webhook,
}
