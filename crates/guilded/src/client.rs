//! The high-level client handle.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use guilded_core::{
    Channel, ClientEvent, EntityCache, Message, Server, Shared, User, cache::DEFAULT_MAX_MESSAGES,
};
use guilded_gateway::{
    AuthStyle, Connection, ConnectionState, EventDecoder, GatewayConfig, GatewayMode,
    GatewayResult, HandlerRegistry, WsConnector, handler_fn,
};

use crate::rest::{DEFAULT_API_BASE, RestClient};

/// Bot-protocol gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "wss://www.guilded.gg/websocket/v1";

/// Environment variable consulted by [`ClientConfig::from_env`].
pub const TOKEN_ENV: &str = "GUILDED_TOKEN";

fn default_user_agent() -> String {
    format!("guilded-rs/{}", env!("CARGO_PKG_VERSION"))
}

fn auth_style(config: &ClientConfig) -> AuthStyle {
    match (&config.mode, &config.token) {
        (GatewayMode::Bot, Some(token)) => AuthStyle::Bearer(token.clone()),
        (GatewayMode::Legacy, Some(cookie)) => AuthStyle::Cookie(cookie.clone()),
        (_, None) => AuthStyle::None,
    }
}

/// Appends the `teamId` query parameter the legacy per-server sockets take.
fn legacy_server_url(base: &str, server_id: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}teamId={server_id}")
}

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bot token (bot mode) or session cookie (legacy mode).
    pub token: Option<String>,
    /// Which wire protocol to speak.
    pub mode: GatewayMode,
    /// Websocket endpoint.
    pub gateway_url: String,
    /// REST endpoint backing cache misses.
    pub api_base: String,
    /// Sent as both the websocket and REST `user-agent`.
    pub user_agent: String,
    /// Bound on the message cache.
    pub max_messages: usize,
    /// Connection tunables (handshake timeout, backoff, heartbeat).
    pub gateway: GatewayConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            mode: GatewayMode::Bot,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: default_user_agent(),
            max_messages: DEFAULT_MAX_MESSAGES,
            gateway: GatewayConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults with an explicit token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Defaults with the token read from `GUILDED_TOKEN`, when set.
    pub fn from_env() -> Self {
        Self {
            token: std::env::var(TOKEN_ENV).ok(),
            ..Self::default()
        }
    }
}

/// One Guilded client: a gateway connection, the entity cache it writes
/// through, and the REST client backing cache misses.
///
/// Register handlers with [`Client::on`], then drive the connection with
/// [`Client::run`] or [`Client::run_until_ctrl_c`].
pub struct Client {
    config: ClientConfig,
    cache: Arc<EntityCache>,
    registry: Arc<HandlerRegistry>,
    rest: Arc<RestClient>,
    decoder: Arc<EventDecoder>,
    connection: Arc<Connection>,
}

impl Client {
    /// Builds a client from `config`. No I/O happens until [`Client::run`].
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let cache = Arc::new(EntityCache::new(config.max_messages));
        let registry = Arc::new(HandlerRegistry::new());
        let rest = Arc::new(RestClient::new(
            config.api_base.clone(),
            config.token.clone(),
            &config.user_agent,
        )?);
        let resources: Arc<dyn guilded_core::ResourceClient> = rest.clone();
        let decoder = Arc::new(EventDecoder::new(
            Arc::clone(&cache),
            resources,
            Arc::clone(&registry),
        ));

        let connector = Arc::new(WsConnector::new(
            config.gateway_url.clone(),
            auth_style(&config),
            config.user_agent.clone(),
        ));
        let connection = Arc::new(Connection::new(
            config.mode,
            connector,
            Arc::clone(&decoder),
            config.gateway.clone(),
        ));

        Ok(Self {
            config,
            cache,
            registry,
            rest,
            decoder,
            connection,
        })
    }

    /// Registers an async handler for the event `name` (`"message"`,
    /// `"member_join"`, ... or `"*"` for everything).
    pub fn on<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(ClientEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.on(name, handler_fn(handler));
    }

    /// The cache the gateway writes through.
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Cached server by id.
    pub fn server(&self, id: &str) -> Option<Shared<Server>> {
        self.cache.server(id)
    }

    /// Cached channel by id.
    pub fn channel(&self, id: &str) -> Option<Shared<Channel>> {
        self.cache.channel(id)
    }

    /// Cached user by id.
    pub fn user(&self, id: &str) -> Option<Shared<User>> {
        self.cache.user(id)
    }

    /// Cached message by id, if it has not been evicted.
    pub fn message(&self, id: &str) -> Option<Shared<Message>> {
        self.cache.message(id)
    }

    /// Direct access to the REST client.
    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    /// Current lifecycle state of the gateway connection.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Heartbeat round-trip time in seconds; infinite before the first ack.
    pub fn latency(&self) -> f64 {
        self.connection.latency()
    }

    /// Requests shutdown; a pending [`Client::run`] returns soon after.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Connects and processes events until [`Client::close`] is called.
    ///
    /// The first connect propagates its error; later drops reconnect with
    /// backoff indefinitely.
    pub async fn run(&self) -> GatewayResult<()> {
        self.connection.run().await
    }

    /// An additional legacy-protocol connection scoped to `server_id`.
    ///
    /// The legacy gateway fans out per server: the global socket carries
    /// account-level traffic while each joined server gets its own
    /// cookie-auth socket. Every connection feeds the same decoder, so
    /// events land in the shared cache and handler registry regardless of
    /// which socket delivered them. Drive the returned connection yourself
    /// or use [`Client::spawn_server_connections`].
    pub fn server_connection(&self, server_id: &str) -> Arc<Connection> {
        let connector = Arc::new(WsConnector::new(
            legacy_server_url(&self.config.gateway_url, server_id),
            auth_style(&self.config),
            self.config.user_agent.clone(),
        ));
        Arc::new(Connection::new(
            GatewayMode::Legacy,
            connector,
            Arc::clone(&self.decoder),
            self.config.gateway.clone(),
        ))
    }

    /// Spawns one legacy per-server connection per id and returns the
    /// handles. A connection that fails its first connect logs the error
    /// and stops; the others are unaffected. Stop one with
    /// [`Connection::close`] on its handle.
    pub fn spawn_server_connections(
        &self,
        server_ids: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Vec<Arc<Connection>> {
        let mut connections = Vec::new();
        for id in server_ids {
            let connection = self.server_connection(id.as_ref());
            let task = Arc::clone(&connection);
            let server_id = id.as_ref().to_string();
            tokio::spawn(async move {
                if let Err(error) = task.run().await {
                    warn!(%server_id, %error, "Server connection ended with an error");
                }
            });
            connections.push(connection);
        }
        connections
    }

    /// Runs until ctrl-c, then shuts the connection down.
    pub async fn run_until_ctrl_c(&self) -> anyhow::Result<()> {
        tokio::select! {
            result = self.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                self.close();
            }
        }
        Ok(())
    }
}
