//! Event decoding, cache write-through, and handler fan-out.
//!
//! A dispatch frame becomes: payload parse → entity resolution (cache
//! first, REST fallback, stub on failure) → cache mutation → handler
//! invocation, strictly in that order and strictly one frame at a time per
//! connection. Handlers run in registration order; a failing or panicking
//! handler is reported through the `error` event and never stops the loop.
//!
//! Unrecognized event tags are a silent no-op so that new server-side event
//! types never break an old client.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace, warn};

use guilded_core::{
    Channel, ClientEvent, EntityCache, Member, MemberRemoveKind, MemberRolesUpdate, ResourceClient,
    Role, Server, Shared, User,
};

use crate::payload::{
    ChannelPayload, ChatMessagePayload, MemberJoinedPayload, MemberRemovedPayload,
    MemberUpdatedPayload, ReactionPayload, RolesUpdatedPayload, TypingPayload, WebhookPayload,
};

/// Guilded's internal system user; messages it "sends" have no author.
pub const SYSTEM_USER_ID: &str = "Ann6LewA";

/// Subscription name that receives every event.
pub const WILDCARD: &str = "*";

/// Boxed future type used by handler trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ===========================================================================
// Handler registry
// ===========================================================================

/// A registered event handler.
pub trait EventHandler: Send + Sync {
    /// Processes one event. Errors are reported through the `error` event.
    fn call(&self, event: ClientEvent) -> BoxFuture<'static, anyhow::Result<()>>;
}

struct FnHandler<F>(F);

impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(ClientEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, event: ClientEvent) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self.0)(event))
    }
}

/// Wraps an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(ClientEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Explicit event-name → handler-list map.
///
/// Shared by every connection of a client; registration order is invocation
/// order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`. Use [`WILDCARD`] to receive every
    /// event.
    pub fn on(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .entry(name.into())
            .or_default()
            .push(handler);
    }

    /// Handlers for `name`, wildcard subscribers included, in registration
    /// order.
    pub fn handlers_for(&self, name: &str) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read();
        let mut out = Vec::new();
        if let Some(list) = handlers.get(name) {
            out.extend(list.iter().cloned());
        }
        if name != WILDCARD
            && let Some(list) = handlers.get(WILDCARD)
        {
            out.extend(list.iter().cloned());
        }
        out
    }
}

// ===========================================================================
// Decoder
// ===========================================================================

/// Turns dispatch frames into cache mutations and handler callbacks.
pub struct EventDecoder {
    cache: Arc<EntityCache>,
    resources: Arc<dyn ResourceClient>,
    registry: Arc<HandlerRegistry>,
}

impl EventDecoder {
    /// Creates a decoder over the shared cache, resource client, and
    /// registry.
    pub fn new(
        cache: Arc<EntityCache>,
        resources: Arc<dyn ResourceClient>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            cache,
            resources,
            registry,
        }
    }

    /// The cache this decoder writes through.
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Decodes and dispatches one event by wire tag.
    ///
    /// The API renamed its `Team*` tags to `Server*`; both spellings decode
    /// identically.
    pub async fn handle_dispatch(&self, name: &str, payload: Value) {
        trace!(tag = name, "Dispatching event");
        match name {
            "ChatMessageCreated" => self.on_message_created(payload).await,
            "ChatMessageUpdated" => self.on_message_updated(payload).await,
            "ChatMessageDeleted" => self.on_message_deleted(payload).await,
            "ServerMemberJoined" | "TeamMemberJoined" => self.on_member_joined(payload).await,
            "ServerMemberRemoved" | "TeamMemberRemoved" => self.on_member_removed(payload).await,
            "ServerMemberUpdated" | "TeamMemberUpdated" => self.on_member_updated(payload).await,
            "ServerRolesUpdated" | "teamRolesUpdated" => self.on_roles_updated(payload).await,
            "ServerChannelCreated" | "TeamChannelCreated" => self.on_channel_created(payload).await,
            "ServerChannelUpdated" | "TeamChannelUpdated" => self.on_channel_updated(payload).await,
            "ServerChannelDeleted" | "TeamChannelDeleted" => self.on_channel_deleted(payload).await,
            "ChannelMessageReactionCreated" => self.on_reaction(payload, true).await,
            "ChannelMessageReactionDeleted" => self.on_reaction(payload, false).await,
            "ChatChannelTyping" => self.on_typing(payload).await,
            "ServerWebhookCreated" | "TeamWebhookCreated" => self.on_webhook(payload, true).await,
            "ServerWebhookUpdated" | "TeamWebhookUpdated" => self.on_webhook(payload, false).await,
            other => {
                // Forward compatibility: unknown tags are dropped quietly.
                trace!(tag = other, "Ignoring unrecognized dispatch");
            }
        }
    }

    /// Invokes every handler registered for `event`, isolating failures.
    pub async fn emit(&self, event: ClientEvent) {
        let mut names = vec![event.name()];
        names.extend_from_slice(event.extra_names());

        for name in names {
            for handler in self.registry.handlers_for(name) {
                let outcome = AssertUnwindSafe(handler.call(event.clone()))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => self.report_handler_error(name, format!("{e:#}")).await,
                    Err(_) => {
                        self.report_handler_error(name, "handler panicked".to_string())
                            .await;
                    }
                }
            }
        }
    }

    async fn report_handler_error(&self, source: &str, message: String) {
        warn!(event = source, error = %message, "Event handler failed");
        if source == "error" {
            // Failing error handlers are only logged, never re-dispatched.
            return;
        }
        let event = ClientEvent::Error {
            message: format!("handler for '{source}' failed: {message}"),
        };
        for handler in self.registry.handlers_for("error") {
            let outcome = AssertUnwindSafe(handler.call(event.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %format!("{e:#}"), "Error handler failed"),
                Err(_) => warn!("Error handler panicked"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Entity resolution (cache → REST → stub)
    // ------------------------------------------------------------------

    async fn resolve_server(&self, server_id: &str) -> Shared<Server> {
        if let Some(server) = self.cache.server(server_id) {
            return server;
        }
        match self.resources.fetch_server(server_id).await {
            Ok(value) => match serde_json::from_value::<Server>(value) {
                Ok(server) => return self.cache.upsert_server(server),
                Err(e) => warn!(server_id, error = %e, "Malformed server payload"),
            },
            Err(e) => warn!(
                server_id,
                error = %e,
                "Received unfetchable server id, constructing a partial instance"
            ),
        }
        self.cache.upsert_server(Server::stub(server_id))
    }

    async fn resolve_channel(&self, channel_id: &str, server_id: Option<&str>) -> Shared<Channel> {
        let cached = match server_id {
            Some(_) => self.cache.channel(channel_id),
            None => self.cache.dm_channel(channel_id),
        };
        if let Some(channel) = cached {
            return channel;
        }

        match self.resources.fetch_channel(channel_id).await {
            Ok(value) => match serde_json::from_value::<Channel>(value) {
                Ok(channel) => {
                    return if channel.server_id.is_some() {
                        self.cache.upsert_channel(channel)
                    } else {
                        self.cache.upsert_dm_channel(channel)
                    };
                }
                Err(e) => warn!(channel_id, error = %e, "Malformed channel payload"),
            },
            Err(e) => debug!(channel_id, error = %e, "Channel fetch failed, using a stub"),
        }

        let stub = Channel::stub(channel_id, server_id.map(str::to_string));
        match server_id {
            Some(_) => self.cache.upsert_channel(stub),
            None => self.cache.upsert_dm_channel(stub),
        }
    }

    /// Caches the author of a message: a member when in a server, a bare
    /// user otherwise. Every lookup failure degrades one level further.
    async fn resolve_author(&self, server_id: Option<&str>, user_id: &str) {
        if let Some(server_id) = server_id {
            if self.cache.member(server_id, user_id).is_some() {
                return;
            }
            if let Ok(value) = self.resources.fetch_member(server_id, user_id).await
                && let Ok(member) = serde_json::from_value::<Member>(value)
            {
                self.cache.upsert_member(member.with_server_id(server_id));
                return;
            }
        } else if self.cache.user(user_id).is_some() {
            return;
        }

        match self.resources.fetch_user(user_id).await {
            Ok(value) => match serde_json::from_value::<User>(value) {
                Ok(user) => {
                    self.cache.upsert_user(user);
                }
                Err(e) => warn!(user_id, error = %e, "Malformed user payload"),
            },
            Err(e) => {
                debug!(user_id, error = %e, "User fetch failed, caching a stub");
                self.cache.upsert_user(User::stub(user_id));
            }
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    async fn on_message_created(&self, payload: Value) {
        let Some(payload) = parse::<ChatMessagePayload>("ChatMessageCreated", payload) else {
            return;
        };
        let mut message = payload.message;
        if message.server_id.is_none() {
            message.server_id = payload.server_id.clone();
        }
        let server_id = message.server_id.clone();

        if let Some(server_id) = &server_id {
            self.resolve_server(server_id).await;
        }
        self.resolve_channel(&message.channel_id, server_id.as_deref())
            .await;

        if let Some(author_id) = message.created_by.clone()
            && author_id != SYSTEM_USER_ID
            && message.created_by_webhook_id.is_none()
        {
            self.resolve_author(server_id.as_deref(), &author_id).await;
        }

        let slot = self.cache.insert_message(message);
        self.emit(ClientEvent::Message(slot)).await;
    }

    async fn on_message_updated(&self, payload: Value) {
        let Some(payload) = parse::<ChatMessagePayload>("ChatMessageUpdated", payload) else {
            return;
        };
        let mut message = payload.message;
        if message.server_id.is_none() {
            message.server_id = payload.server_id;
        }

        let Some(slot) = self.cache.message(&message.id) else {
            // No before to pair with; just take the new state.
            self.cache.insert_message(message);
            return;
        };

        let before = slot.read().clone();
        *slot.write() = message;
        self.emit(ClientEvent::MessageUpdate {
            before,
            after: slot,
        })
        .await;
    }

    async fn on_message_deleted(&self, payload: Value) {
        let Some(payload) = parse::<ChatMessagePayload>("ChatMessageDeleted", payload) else {
            return;
        };

        let Some(slot) = self.cache.remove_message(&payload.message.id) else {
            debug!(
                message_id = %payload.message.id,
                "Delete for an uncached message"
            );
            return;
        };

        slot.write().deleted_at = payload.message.deleted_at.clone();
        let message = slot.read().clone();
        self.emit(ClientEvent::MessageDelete { message }).await;
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    async fn on_member_joined(&self, payload: Value) {
        let Some(payload) = parse::<MemberJoinedPayload>("ServerMemberJoined", payload) else {
            return;
        };
        self.resolve_server(&payload.server_id).await;
        let member = payload.member.with_server_id(&payload.server_id);
        let slot = self.cache.upsert_member(member);
        self.emit(ClientEvent::MemberJoin(slot)).await;
    }

    async fn on_member_removed(&self, payload: Value) {
        let Some(payload) = parse::<MemberRemovedPayload>("ServerMemberRemoved", payload) else {
            return;
        };

        let member = match self.cache.remove_member(&payload.server_id, &payload.user_id) {
            Some(slot) => slot.read().clone(),
            None => Member::stub(&payload.server_id, &payload.user_id),
        };
        let kind = if payload.is_ban {
            MemberRemoveKind::Ban
        } else if payload.is_kick {
            MemberRemoveKind::Kick
        } else {
            MemberRemoveKind::Leave
        };
        self.emit(ClientEvent::MemberRemove { member, kind }).await;
    }

    async fn on_member_updated(&self, payload: Value) {
        let Some(payload) = parse::<MemberUpdatedPayload>("ServerMemberUpdated", payload) else {
            return;
        };
        let Some(user_id) = payload.member_id().map(str::to_string) else {
            warn!("Member update without a user id");
            return;
        };

        let Some(slot) = self.cache.member(&payload.server_id, &user_id) else {
            // Never seen this member; cache what we were given.
            let mut member = Member::stub(&payload.server_id, &user_id);
            member.update_nickname(payload.user_info.nickname.clone());
            self.cache.upsert_member(member);
            return;
        };

        let before = slot.read().clone();
        slot.write()
            .update_nickname(payload.user_info.nickname.clone());
        self.emit(ClientEvent::MemberUpdate {
            before,
            after: slot,
        })
        .await;
    }

    async fn on_roles_updated(&self, payload: Value) {
        let Some(payload) = parse::<RolesUpdatedPayload>("ServerRolesUpdated", payload) else {
            return;
        };
        let server_id = payload.server_id.clone();
        let mut updates = Vec::new();

        for entry in &payload.member_role_ids {
            for role_id in &entry.role_ids {
                if self.cache.role(*role_id).is_none() {
                    self.cache.upsert_role(Role::stub(&server_id, *role_id));
                }
            }

            match self.cache.member(&server_id, &entry.user_id) {
                Some(slot) => {
                    let before = slot.read().clone();
                    slot.write().set_role_ids(entry.role_ids.clone());
                    updates.push(MemberRolesUpdate {
                        user_id: entry.user_id.clone(),
                        before_role_ids: Some(before.role_ids.clone()),
                        role_ids: entry.role_ids.clone(),
                    });
                    self.emit(ClientEvent::MemberUpdate {
                        before,
                        after: slot,
                    })
                    .await;
                }
                None => {
                    let mut member = Member::stub(&server_id, &entry.user_id);
                    member.set_role_ids(entry.role_ids.clone());
                    self.cache.upsert_member(member);
                    updates.push(MemberRolesUpdate {
                        user_id: entry.user_id.clone(),
                        before_role_ids: None,
                        role_ids: entry.role_ids.clone(),
                    });
                }
            }
        }

        if !payload.roles_by_id.is_empty() {
            // The full role list is sent, so a rebuild beats a merge.
            self.cache.clear_server_roles(&server_id);
            for (key, value) in &payload.roles_by_id {
                // "baseRole" duplicates a numeric entry; skip it.
                if !key.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                match serde_json::from_value::<Role>(value.clone()) {
                    Ok(mut role) => {
                        role.server_id = server_id.clone();
                        self.cache.upsert_role(role);
                    }
                    Err(e) => warn!(role_id = %key, error = %e, "Malformed role payload"),
                }
            }
        }

        self.emit(ClientEvent::BulkMemberRolesUpdate { server_id, updates })
            .await;
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    async fn on_channel_created(&self, payload: Value) {
        let Some(payload) = parse::<ChannelPayload>("ServerChannelCreated", payload) else {
            return;
        };
        let mut channel = payload.channel;
        if channel.server_id.is_none() {
            channel.server_id = payload.server_id;
        }
        let slot = self.cache.upsert_channel(channel);
        self.emit(ClientEvent::ChannelCreate(slot)).await;
    }

    async fn on_channel_updated(&self, payload: Value) {
        let Some(payload) = parse::<ChannelPayload>("ServerChannelUpdated", payload) else {
            return;
        };
        let mut channel = payload.channel;
        if channel.server_id.is_none() {
            channel.server_id = payload.server_id;
        }

        let Some(slot) = self.cache.channel(&channel.id) else {
            self.cache.upsert_channel(channel);
            return;
        };

        let before = slot.read().clone();
        *slot.write() = channel;
        self.emit(ClientEvent::ChannelUpdate {
            before,
            after: slot,
        })
        .await;
    }

    async fn on_channel_deleted(&self, payload: Value) {
        let Some(payload) = parse::<ChannelPayload>("ServerChannelDeleted", payload) else {
            return;
        };
        let channel = match self.cache.remove_channel(&payload.channel.id) {
            Some(slot) => slot.read().clone(),
            None => payload.channel,
        };
        self.emit(ClientEvent::ChannelDelete { channel }).await;
    }

    // ------------------------------------------------------------------
    // Reactions, typing, webhooks
    // ------------------------------------------------------------------

    async fn on_reaction(&self, payload: Value, added: bool) {
        let Some(payload) = parse::<ReactionPayload>("ChannelMessageReaction", payload) else {
            return;
        };
        self.cache.upsert_emote(payload.reaction.emote.clone());
        let event = if added {
            ClientEvent::ReactionAdd(payload.reaction)
        } else {
            ClientEvent::ReactionRemove(payload.reaction)
        };
        self.emit(event).await;
    }

    async fn on_typing(&self, payload: Value) {
        let Some(payload) = parse::<TypingPayload>("ChatChannelTyping", payload) else {
            return;
        };
        self.emit(ClientEvent::Typing {
            channel_id: payload.channel_id,
            user_id: payload.user_id,
        })
        .await;
    }

    async fn on_webhook(&self, payload: Value, created: bool) {
        let Some(payload) = parse::<WebhookPayload>("ServerWebhook", payload) else {
            return;
        };
        let event = if created {
            ClientEvent::WebhookCreate(payload.webhook)
        } else {
            ClientEvent::WebhookUpdate(payload.webhook)
        };
        self.emit(event).await;
    }
}

/// Parses a dispatch payload, logging and dropping malformed ones.
fn parse<T: serde::de::DeserializeOwned>(tag: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(tag, error = %e, "Malformed dispatch payload, dropping frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use guilded_core::NoopResourceClient;
    use serde_json::json;

    fn decoder() -> (Arc<EventDecoder>, Arc<HandlerRegistry>, Arc<EntityCache>) {
        let cache = Arc::new(EntityCache::default());
        let registry = Arc::new(HandlerRegistry::new());
        let decoder = Arc::new(EventDecoder::new(
            Arc::clone(&cache),
            Arc::new(NoopResourceClient),
            Arc::clone(&registry),
        ));
        (decoder, registry, cache)
    }

    fn counter(registry: &HandlerRegistry, name: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        registry.on(
            name,
            handler_fn(move |_event| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        count
    }

    fn message_created(id: &str) -> Value {
        json!({
            "serverId": "S1",
            "message": {
                "id": id,
                "channelId": "C1",
                "createdBy": "U1",
                "content": "hi"
            }
        })
    }

    #[tokio::test]
    async fn test_message_created_caches_and_dispatches() {
        let (decoder, registry, cache) = decoder();
        let calls = counter(&registry, "message");

        decoder
            .handle_dispatch("ChatMessageCreated", message_created("M1"))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let message = cache.message("M1").expect("message cached");
        assert_eq!(message.read().content.as_deref(), Some("hi"));
        // Stub entities were cached for the unfetchable references.
        assert!(cache.server("S1").is_some());
        assert!(cache.channel("C1").is_some());
        assert!(cache.user("U1").is_some());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_a_noop() {
        let (decoder, registry, cache) = decoder();
        let wildcard = counter(&registry, WILDCARD);

        decoder
            .handle_dispatch("CalendarHologramMaterialized", json!({"serverId": "S1"}))
            .await;

        assert_eq!(wildcard.load(Ordering::SeqCst), 0);
        assert!(cache.server("S1").is_none());
        assert_eq!(cache.message_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_the_loop() {
        let (decoder, registry, _cache) = decoder();
        registry.on(
            "message",
            handler_fn(|_event| async { anyhow::bail!("boom") }),
        );
        let errors = counter(&registry, "error");
        let updates = counter(&registry, "message_update");

        decoder
            .handle_dispatch("ChatMessageCreated", message_created("M1"))
            .await;
        decoder
            .handle_dispatch(
                "ChatMessageUpdated",
                json!({
                    "serverId": "S1",
                    "message": {"id": "M1", "channelId": "C1", "content": "edited"}
                }),
            )
            .await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let (decoder, registry, _cache) = decoder();
        registry.on(
            "message",
            handler_fn(|_event| async { panic!("handler bug") }),
        );
        let after = counter(&registry, "message");

        decoder
            .handle_dispatch("ChatMessageCreated", message_created("M1"))
            .await;

        // The handler registered after the panicking one still ran.
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_message_update_pairs_before_and_after() {
        let (decoder, registry, cache) = decoder();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.on(
            "message_update",
            handler_fn(move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event).ok();
                    Ok(())
                }
            }),
        );

        decoder
            .handle_dispatch("ChatMessageCreated", message_created("M1"))
            .await;
        decoder
            .handle_dispatch(
                "ChatMessageUpdated",
                json!({
                    "serverId": "S1",
                    "message": {"id": "M1", "channelId": "C1", "content": "edited"}
                }),
            )
            .await;

        match rx.recv().await.expect("update event") {
            ClientEvent::MessageUpdate { before, after } => {
                assert_eq!(before.content.as_deref(), Some("hi"));
                assert_eq!(after.read().content.as_deref(), Some("edited"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        // Slot identity survived the update.
        let slot = cache.message("M1").unwrap();
        assert_eq!(slot.read().content.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn test_member_removed_kinds() {
        let (decoder, registry, cache) = decoder();
        let bans = counter(&registry, "member_ban");
        let removes = counter(&registry, "member_remove");

        cache.upsert_member(Member::stub("S1", "U1"));
        decoder
            .handle_dispatch(
                "ServerMemberRemoved",
                json!({"serverId": "S1", "userId": "U1", "isBan": true}),
            )
            .await;

        assert_eq!(removes.load(Ordering::SeqCst), 1);
        assert_eq!(bans.load(Ordering::SeqCst), 1);
        assert!(cache.member("S1", "U1").is_none());
    }

    #[tokio::test]
    async fn test_roles_updated_rebuilds_role_list() {
        let (decoder, registry, cache) = decoder();
        let bulk = counter(&registry, "bulk_member_roles_update");
        cache.upsert_role(Role::stub("S1", 999));

        decoder
            .handle_dispatch(
                "ServerRolesUpdated",
                json!({
                    "serverId": "S1",
                    "memberRoleIds": [{"userId": "U1", "roleIds": [100]}],
                    "rolesById": {
                        "100": {"id": 100, "name": "Admin"},
                        "baseRole": {"id": 100, "name": "Admin"}
                    }
                }),
            )
            .await;

        assert_eq!(bulk.load(Ordering::SeqCst), 1);
        // Old role gone, new list in place, baseRole not duplicated.
        assert!(cache.role(999).is_none());
        assert_eq!(
            cache.role(100).unwrap().read().name.as_deref(),
            Some("Admin")
        );
        // The member picked up the new role set.
        assert_eq!(cache.member("S1", "U1").unwrap().read().role_ids, vec![100]);
    }

    #[tokio::test]
    async fn test_typing_and_reaction() {
        let (decoder, registry, cache) = decoder();
        let typing = counter(&registry, "typing");
        let reactions = counter(&registry, "reaction_add");

        decoder
            .handle_dispatch(
                "ChatChannelTyping",
                json!({"channelId": "C1", "userId": "U1"}),
            )
            .await;
        decoder
            .handle_dispatch(
                "ChannelMessageReactionCreated",
                json!({
                    "serverId": "S1",
                    "reaction": {
                        "channelId": "C1",
                        "messageId": "M1",
                        "createdBy": "U1",
                        "emote": {"id": 42, "name": "grin"}
                    }
                }),
            )
            .await;

        assert_eq!(typing.load(Ordering::SeqCst), 1);
        assert_eq!(reactions.load(Ordering::SeqCst), 1);
        assert!(cache.emote(42).is_some());
    }
}
