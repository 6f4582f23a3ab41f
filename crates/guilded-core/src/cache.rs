//! The process-wide entity cache.
//!
//! One [`EntityCache`] is shared by every gateway connection and by the
//! facade client. Each category is a map keyed by the entity's stable id;
//! inserting an id that already exists overwrites the stored value in place
//! (last-write-wins), never duplicates.
//!
//! # Shared-handle semantics
//!
//! Cache slots hold [`Shared`] handles (`Arc<RwLock<T>>`). An upsert for an
//! existing id writes *through* the existing lock rather than replacing the
//! `Arc`, so any clone of the handle held elsewhere observes the update.
//! Before/after event pairs are produced by cloning the inner value before
//! the write.
//!
//! # Message bound
//!
//! The message store is capacity-bounded FIFO: inserting past the bound
//! evicts the oldest message by arrival order. This is deliberately not an
//! LRU so eviction order stays predictable.
//!
//! All mutation is serialized by the per-category locks, which is what makes
//! the cache safe to share between the per-server sockets of legacy mode.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{Channel, Emote, Member, Message, Role, Server, User};

/// A shared, in-place-mutable handle to a cached entity.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wraps a value in a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Default bound for the message store.
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

#[derive(Default)]
struct MessageStore {
    entries: HashMap<String, Shared<Message>>,
    /// Arrival order of the ids in `entries`.
    order: VecDeque<String>,
    capacity: usize,
}

impl MessageStore {
    fn insert(&mut self, message: Message) -> Shared<Message> {
        if let Some(existing) = self.entries.get(&message.id) {
            *existing.write() = message;
            return Arc::clone(existing);
        }

        let id = message.id.clone();
        let slot = shared(message);
        self.entries.insert(id.clone(), Arc::clone(&slot));
        self.order.push_back(id);

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        slot
    }

    fn remove(&mut self, id: &str) -> Option<Shared<Message>> {
        let removed = self.entries.remove(id);
        if removed.is_some() {
            self.order.retain(|stored| stored != id);
        }
        removed
    }
}

/// The single mutable store every decoder writes through.
pub struct EntityCache {
    servers: RwLock<HashMap<String, Shared<Server>>>,
    channels: RwLock<HashMap<String, Shared<Channel>>>,
    dm_channels: RwLock<HashMap<String, Shared<Channel>>>,
    /// Keyed by `(server_id, user_id)`.
    members: RwLock<HashMap<(String, String), Shared<Member>>>,
    users: RwLock<HashMap<String, Shared<User>>>,
    roles: RwLock<HashMap<u64, Shared<Role>>>,
    emotes: RwLock<HashMap<u64, Shared<Emote>>>,
    messages: RwLock<MessageStore>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

impl EntityCache {
    /// Creates a cache whose message store holds at most `max_messages`
    /// entries.
    pub fn new(max_messages: usize) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            dm_channels: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            emotes: RwLock::new(HashMap::new()),
            messages: RwLock::new(MessageStore {
                capacity: max_messages,
                ..MessageStore::default()
            }),
        }
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    /// Looks up a server by id.
    pub fn server(&self, id: &str) -> Option<Shared<Server>> {
        self.servers.read().get(id).cloned()
    }

    /// Inserts or overwrites a server, returning its shared slot.
    pub fn upsert_server(&self, server: Server) -> Shared<Server> {
        upsert(&self.servers, server.id.clone(), server)
    }

    /// Removes a server from the cache.
    pub fn remove_server(&self, id: &str) -> Option<Shared<Server>> {
        self.servers.write().remove(id)
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Looks up a server channel or thread by id.
    pub fn channel(&self, id: &str) -> Option<Shared<Channel>> {
        self.channels.read().get(id).cloned()
    }

    /// Inserts or overwrites a server channel.
    pub fn upsert_channel(&self, channel: Channel) -> Shared<Channel> {
        upsert(&self.channels, channel.id.clone(), channel)
    }

    /// Removes a server channel.
    pub fn remove_channel(&self, id: &str) -> Option<Shared<Channel>> {
        self.channels.write().remove(id)
    }

    /// Looks up a DM channel by id.
    pub fn dm_channel(&self, id: &str) -> Option<Shared<Channel>> {
        self.dm_channels.read().get(id).cloned()
    }

    /// Inserts or overwrites a DM channel.
    pub fn upsert_dm_channel(&self, channel: Channel) -> Shared<Channel> {
        upsert(&self.dm_channels, channel.id.clone(), channel)
    }

    // ------------------------------------------------------------------
    // Members and users
    // ------------------------------------------------------------------

    /// Looks up a member by `(server_id, user_id)`.
    pub fn member(&self, server_id: &str, user_id: &str) -> Option<Shared<Member>> {
        self.members
            .read()
            .get(&(server_id.to_string(), user_id.to_string()))
            .cloned()
    }

    /// Inserts or overwrites a member under its server.
    pub fn upsert_member(&self, member: Member) -> Shared<Member> {
        let key = (member.server_id.clone(), member.user.id.clone());
        upsert(&self.members, key, member)
    }

    /// Removes a member from a server.
    pub fn remove_member(&self, server_id: &str, user_id: &str) -> Option<Shared<Member>> {
        self.members
            .write()
            .remove(&(server_id.to_string(), user_id.to_string()))
    }

    /// Looks up a bare (server-less) user by id.
    pub fn user(&self, id: &str) -> Option<Shared<User>> {
        self.users.read().get(id).cloned()
    }

    /// Inserts or overwrites a bare user.
    pub fn upsert_user(&self, user: User) -> Shared<User> {
        upsert(&self.users, user.id.clone(), user)
    }

    /// Removes a bare user.
    pub fn remove_user(&self, id: &str) -> Option<Shared<User>> {
        self.users.write().remove(id)
    }

    // ------------------------------------------------------------------
    // Roles and emotes
    // ------------------------------------------------------------------

    /// Looks up a role by id.
    pub fn role(&self, id: u64) -> Option<Shared<Role>> {
        self.roles.read().get(&id).cloned()
    }

    /// Inserts or overwrites a role.
    pub fn upsert_role(&self, role: Role) -> Shared<Role> {
        upsert(&self.roles, role.id, role)
    }

    /// Removes a role.
    pub fn remove_role(&self, id: u64) -> Option<Shared<Role>> {
        self.roles.write().remove(&id)
    }

    /// Drops every cached role belonging to `server_id`.
    ///
    /// `ServerRolesUpdated` sends the full role list, so the decoder clears
    /// and rebuilds rather than merging.
    pub fn clear_server_roles(&self, server_id: &str) {
        self.roles
            .write()
            .retain(|_, role| role.read().server_id != server_id);
    }

    /// Looks up an emote by id.
    pub fn emote(&self, id: u64) -> Option<Shared<Emote>> {
        self.emotes.read().get(&id).cloned()
    }

    /// Inserts or overwrites an emote.
    pub fn upsert_emote(&self, emote: Emote) -> Shared<Emote> {
        upsert(&self.emotes, emote.id, emote)
    }

    // ------------------------------------------------------------------
    // Messages (bounded FIFO)
    // ------------------------------------------------------------------

    /// Looks up a message by id.
    pub fn message(&self, id: &str) -> Option<Shared<Message>> {
        self.messages.read().entries.get(id).cloned()
    }

    /// Inserts a message, evicting the oldest entries past the configured
    /// bound. Re-inserting a cached id overwrites in place without touching
    /// the arrival order.
    pub fn insert_message(&self, message: Message) -> Shared<Message> {
        self.messages.write().insert(message)
    }

    /// Removes a message (e.g. on `ChatMessageDeleted`).
    pub fn remove_message(&self, id: &str) -> Option<Shared<Message>> {
        self.messages.write().remove(id)
    }

    /// Number of currently cached messages.
    pub fn message_count(&self) -> usize {
        self.messages.read().entries.len()
    }

    /// Ids of cached messages in arrival order, oldest first.
    pub fn message_ids(&self) -> Vec<String> {
        self.messages.read().order.iter().cloned().collect()
    }
}

/// Last-write-wins upsert that preserves slot identity for existing keys.
fn upsert<K, T>(map: &RwLock<HashMap<K, Shared<T>>>, key: K, value: T) -> Shared<T>
where
    K: std::hash::Hash + Eq,
{
    let mut map = map.write();
    if let Some(existing) = map.get(&key) {
        *existing.write() = value;
        return Arc::clone(existing);
    }
    let slot = shared(value);
    map.insert(key, Arc::clone(&slot));
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            channel_id: "C1".to_string(),
            content: Some(format!("content of {id}")),
            ..Message::default()
        }
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let cache = EntityCache::default();
        let first = cache.upsert_user(User {
            id: "U1".into(),
            name: Some("old".into()),
            ..User::default()
        });

        // A handle taken before the second upsert...
        let held = Arc::clone(&first);
        let before = held.read().clone();

        let second = cache.upsert_user(User {
            id: "U1".into(),
            name: Some("new".into()),
            ..User::default()
        });

        // ...observes the overwrite, and slot identity is preserved.
        assert!(Arc::ptr_eq(&held, &second));
        assert_eq!(before.name.as_deref(), Some("old"));
        assert_eq!(held.read().name.as_deref(), Some("new"));
    }

    #[test]
    fn test_member_scoped_per_server() {
        let cache = EntityCache::default();
        cache.upsert_member(Member::stub("S1", "U1"));
        cache.upsert_member(Member::stub("S2", "U1"));
        cache.upsert_user(User::stub("U1"));

        assert!(cache.member("S1", "U1").is_some());
        assert!(cache.member("S2", "U1").is_some());
        assert!(cache.member("S3", "U1").is_none());
        assert!(cache.user("U1").is_some());
    }

    #[test]
    fn test_message_bound_evicts_oldest_fifo() {
        let cache = EntityCache::new(3);
        for id in ["M1", "M2", "M3", "M4"] {
            cache.insert_message(message(id));
        }

        assert_eq!(cache.message_count(), 3);
        assert!(cache.message("M1").is_none());
        assert_eq!(cache.message_ids(), vec!["M2", "M3", "M4"]);
    }

    #[test]
    fn test_message_reinsert_keeps_order() {
        let cache = EntityCache::new(3);
        cache.insert_message(message("M1"));
        cache.insert_message(message("M2"));
        // Overwrite of a cached id is not a new arrival.
        cache.insert_message(message("M1"));
        cache.insert_message(message("M3"));
        cache.insert_message(message("M4"));

        assert!(cache.message("M1").is_none());
        assert_eq!(cache.message_ids(), vec!["M2", "M3", "M4"]);
    }

    #[test]
    fn test_clear_server_roles_is_scoped() {
        let cache = EntityCache::default();
        cache.upsert_role(Role::stub("S1", 1));
        cache.upsert_role(Role::stub("S1", 2));
        cache.upsert_role(Role::stub("S2", 3));

        cache.clear_server_roles("S1");
        assert!(cache.role(1).is_none());
        assert!(cache.role(2).is_none());
        assert!(cache.role(3).is_some());
    }
}
