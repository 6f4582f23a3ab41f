//! Channel entities.

use serde::{Deserialize, Serialize};

/// The content type of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Announcement channels.
    Announcements,
    /// Chat (text) channels. Also used for stub channels whose real type is
    /// unknown.
    #[default]
    Chat,
    /// Calendar channels.
    Calendar,
    /// Forum channels.
    Forums,
    /// Media channels.
    Media,
    /// Document channels.
    Docs,
    /// Voice channels.
    Voice,
    /// List (task) channels.
    List,
    /// Scheduling (availability) channels.
    Scheduling,
    /// Streaming channels.
    Stream,
    /// Any type this library does not know about yet.
    #[serde(other)]
    Unknown,
}

/// A server channel, thread, or DM channel.
///
/// DM channels have no `server_id` and are cached in their own category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Stable channel id (a UUID).
    pub id: String,
    /// The owning server, if any.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The owning group within the server.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Content type.
    #[serde(default, rename = "type")]
    pub kind: ChannelKind,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Topic/description.
    #[serde(default)]
    pub topic: Option<String>,
    /// The category containing the channel.
    #[serde(default)]
    pub category_id: Option<u64>,
    /// For threads: the channel this was created under.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// For threads: the message this was created from.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Id of the creating user.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Whether the channel is visible only to select members.
    #[serde(default)]
    pub is_public: bool,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last-update time.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// ISO-8601 archival time, if archived.
    #[serde(default)]
    pub archived_at: Option<String>,
}

impl Channel {
    /// Builds a minimal chat channel when only ids are known.
    ///
    /// The decoder falls back to this when a message references a channel
    /// that cannot be fetched.
    pub fn stub(id: impl Into<String>, server_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            server_id,
            kind: ChannelKind::Chat,
            ..Self::default()
        }
    }

    /// Whether this is a thread (created under another channel).
    pub fn is_thread(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_channel_type_is_tolerated() {
        let channel: Channel = serde_json::from_str(
            r#"{"id": "C1", "serverId": "S1", "type": "holograms", "name": "general"}"#,
        )
        .unwrap();
        assert_eq!(channel.kind, ChannelKind::Unknown);
        assert!(!channel.is_thread());
    }

    #[test]
    fn test_thread_detection() {
        let channel: Channel = serde_json::from_str(
            r#"{"id": "C2", "serverId": "S1", "type": "chat", "parentId": "C1", "messageId": "M1"}"#,
        )
        .unwrap();
        assert!(channel.is_thread());
    }
}
