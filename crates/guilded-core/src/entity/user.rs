//! User entities.

use serde::{Deserialize, Serialize};

/// A Guilded user outside of any server context.
///
/// Users are cached once per process; the same person appearing in several
/// servers additionally has one [`Member`](super::Member) entry per server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// `"bot"` or `"user"`. Absent for some partial payloads.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Avatar image URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Banner image URL.
    #[serde(default)]
    pub banner: Option<String>,
    /// ISO-8601 account creation time.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    /// Builds a minimal user when only the id is known.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether this account is a bot/flow account.
    pub fn is_bot(&self) -> bool {
        self.kind.as_deref() == Some("bot")
    }

    /// Overwrites fields from a newer payload, keeping the id.
    ///
    /// Absent optional fields in `newer` leave the current value untouched,
    /// so partial payloads never erase known data.
    pub fn update(&mut self, newer: &User) {
        if newer.name.is_some() {
            self.name = newer.name.clone();
        }
        if newer.kind.is_some() {
            self.kind = newer.kind.clone();
        }
        if newer.avatar.is_some() {
            self.avatar = newer.avatar.clone();
        }
        if newer.banner.is_some() {
            self.banner = newer.banner.clone();
        }
        if newer.created_at.is_some() {
            self.created_at = newer.created_at.clone();
        }
    }
}
