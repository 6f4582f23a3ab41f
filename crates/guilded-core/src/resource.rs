//! The REST collaborator seam.
//!
//! The event decoder never talks HTTP directly. When a dispatch references
//! an entity that is not cached, it asks a [`ResourceClient`] for the raw
//! wire object and degrades to a stub if the lookup fails. The production
//! implementation lives in the `guilded` facade crate; tests inject mocks
//! through this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ResourceError, ResourceResult};

/// Async lookups for the entities a gateway event may reference.
///
/// Each method returns the bare entity object from the wire (the API's outer
/// wrapper key, e.g. `{"server": ...}`, is already unwrapped).
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetches a server by id.
    async fn fetch_server(&self, server_id: &str) -> ResourceResult<Value>;

    /// Fetches a channel by id.
    async fn fetch_channel(&self, channel_id: &str) -> ResourceResult<Value>;

    /// Fetches a member of a server.
    async fn fetch_member(&self, server_id: &str, user_id: &str) -> ResourceResult<Value>;

    /// Fetches a user by id.
    async fn fetch_user(&self, user_id: &str) -> ResourceResult<Value>;
}

/// A [`ResourceClient`] that never finds anything.
///
/// Backs tests and cache-only operation; every lookup reports
/// [`ResourceError::NotFound`], which the decoder turns into stub entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResourceClient;

#[async_trait]
impl ResourceClient for NoopResourceClient {
    async fn fetch_server(&self, server_id: &str) -> ResourceResult<Value> {
        Err(ResourceError::NotFound {
            path: format!("/servers/{server_id}"),
        })
    }

    async fn fetch_channel(&self, channel_id: &str) -> ResourceResult<Value> {
        Err(ResourceError::NotFound {
            path: format!("/channels/{channel_id}"),
        })
    }

    async fn fetch_member(&self, server_id: &str, user_id: &str) -> ResourceResult<Value> {
        Err(ResourceError::NotFound {
            path: format!("/servers/{server_id}/members/{user_id}"),
        })
    }

    async fn fetch_user(&self, user_id: &str) -> ResourceResult<Value> {
        Err(ResourceError::NotFound {
            path: format!("/users/{user_id}"),
        })
    }
}
