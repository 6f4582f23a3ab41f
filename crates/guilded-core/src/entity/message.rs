//! Message, reaction, emote, and webhook entities.

use serde::{Deserialize, Serialize};

/// A chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Stable message id (a UUID).
    pub id: String,
    /// The channel the message was sent in.
    #[serde(default)]
    pub channel_id: String,
    /// The owning server, absent for DMs.
    #[serde(default)]
    pub server_id: Option<String>,
    /// `"default"` or `"system"`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Markdown content. Absent for purely-embed messages.
    #[serde(default)]
    pub content: Option<String>,
    /// Id of the sending user.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Id of the sending webhook, if any.
    #[serde(default)]
    pub created_by_webhook_id: Option<String>,
    /// Messages this one replies to.
    #[serde(default)]
    pub reply_message_ids: Vec<String>,
    /// Whether the message is visible only to the replied-to users.
    #[serde(default)]
    pub is_private: bool,
    /// Whether the message pings everyone without notification.
    #[serde(default)]
    pub is_silent: bool,
    /// User ids mentioned by the message.
    #[serde(default)]
    pub mention_user_ids: Vec<String>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last-edit time.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// ISO-8601 deletion time, set by `ChatMessageDeleted`.
    #[serde(default)]
    pub deleted_at: Option<String>,
}

/// A custom emote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emote {
    /// Stable numeric emote id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Image URL.
    #[serde(default)]
    pub url: Option<String>,
    /// The server the emote belongs to; absent for stock emotes.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// A single reaction on a message.
///
/// Built from `ChannelMessageReaction*` dispatches; reactions are not
/// cached, only the contained [`Emote`] is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// The channel containing the message.
    #[serde(default)]
    pub channel_id: String,
    /// The message reacted to.
    #[serde(default)]
    pub message_id: String,
    /// The reacting user.
    #[serde(default)]
    pub created_by: String,
    /// The emote used.
    #[serde(default)]
    pub emote: Emote,
}

/// A channel webhook.
///
/// Webhooks are not cached; `ServerWebhook*` dispatches hand the parsed
/// object straight to handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Stable webhook id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// The owning server.
    #[serde(default)]
    pub server_id: Option<String>,
    /// The channel the webhook posts in.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Id of the creating user.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Execution token; only present for webhooks the client may execute.
    #[serde(default)]
    pub token: Option<String>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 deletion time, if deleted.
    #[serde(default)]
    pub deleted_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_wire_payload() {
        let message: Message = serde_json::from_str(
            r#"{
                "id": "M1",
                "type": "default",
                "serverId": "S1",
                "channelId": "C1",
                "content": "hi",
                "createdBy": "U1",
                "createdAt": "2022-01-01T00:00:00.000Z"
            }"#,
        )
        .unwrap();

        assert_eq!(message.id, "M1");
        assert_eq!(message.channel_id, "C1");
        assert_eq!(message.content.as_deref(), Some("hi"));
        assert!(message.deleted_at.is_none());
    }

    #[test]
    fn test_reaction_carries_emote() {
        let reaction: Reaction = serde_json::from_str(
            r#"{
                "channelId": "C1",
                "messageId": "M1",
                "createdBy": "U1",
                "emote": {"id": 90001164, "name": "blobspearpeek", "url": "https://img"}
            }"#,
        )
        .unwrap();
        assert_eq!(reaction.emote.id, 90001164);
    }
}
