//! Server, member, and role entities.

use serde::{Deserialize, Serialize};

use super::user::User;

/// A Guilded server (historically "team").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Stable server id.
    pub id: String,
    /// Owner's user id.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Server kind (`"community"`, `"team"`, ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Vanity URL slug.
    #[serde(default)]
    pub url: Option<String>,
    /// About/description text.
    #[serde(default)]
    pub about: Option<String>,
    /// Icon URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Banner URL.
    #[serde(default)]
    pub banner: Option<String>,
    /// Server timezone.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Whether the server is verified.
    #[serde(default)]
    pub is_verified: bool,
    /// The channel new members land in.
    #[serde(default)]
    pub default_channel_id: Option<String>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Server {
    /// Builds a minimal server when only the id is known.
    ///
    /// The decoder falls back to this when a dispatch references a server
    /// the REST API refuses to return.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A user's membership in one server.
///
/// The same user id may appear under several servers with distinct member
/// entries; member identity is the `(server_id, user id)` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The underlying user profile.
    #[serde(default)]
    pub user: User,
    /// The server this membership belongs to. Not part of the wire member
    /// object itself; filled in from the surrounding event payload.
    #[serde(default)]
    pub server_id: String,
    /// Per-server nickname.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Ids of the roles held in this server.
    #[serde(default)]
    pub role_ids: Vec<u64>,
    /// ISO-8601 join time.
    #[serde(default)]
    pub joined_at: Option<String>,
    /// Whether this member owns the server.
    #[serde(default)]
    pub is_owner: bool,
}

impl Member {
    /// The member's user id.
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Builds a minimal member when only the ids are known.
    pub fn stub(server_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user: User::stub(user_id),
            server_id: server_id.into(),
            ..Self::default()
        }
    }

    /// Attaches the owning server id (wire member objects omit it).
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Applies a `ServerMemberUpdated` delta (currently only the nickname).
    ///
    /// A `null` nickname on the wire means it was cleared, so unlike
    /// [`User::update`] this overwrites unconditionally.
    pub fn update_nickname(&mut self, nickname: Option<String>) {
        self.nickname = nickname;
    }

    /// Replaces the member's role set from a roles update.
    pub fn set_role_ids(&mut self, role_ids: Vec<u64>) {
        self.role_ids = role_ids;
    }
}

/// A server role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Stable numeric role id.
    pub id: u64,
    /// The server the role belongs to. Filled in from the surrounding event
    /// payload when absent.
    #[serde(default)]
    pub server_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether this is the server's base (everyone) role.
    #[serde(default)]
    pub is_base: bool,
    /// Sidebar position.
    #[serde(default)]
    pub priority: Option<i64>,
    /// Whether the role is shown separately in the member list.
    #[serde(default)]
    pub is_displayed_separately: bool,
    /// Whether members can self-assign the role.
    #[serde(default)]
    pub is_self_assignable: bool,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Role {
    /// Builds a minimal role when only the ids are known.
    pub fn stub(server_id: impl Into<String>, id: u64) -> Self {
        Self {
            id,
            server_id: server_id.into(),
            ..Self::default()
        }
    }
}
