//! REST resource client backing cache misses.
//!
//! The gateway decoder asks this client for entities the cache has never
//! seen. Requests retry on rate limits and transient server errors; hard
//! failures map onto [`ResourceError`] so the decoder can degrade to stub
//! entities instead of dropping the event.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use guilded_core::{ResourceClient, ResourceError, ResourceResult};

/// Public REST API base.
pub const DEFAULT_API_BASE: &str = "https://www.guilded.gg/api/v1";

/// Attempts per request, rate-limit and 5xx retries included.
const MAX_TRIES: u32 = 5;

/// Request timeout for a single attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback delay when a 429 arrives without a `retry-after` header.
const DEFAULT_RETRY_AFTER: f64 = 3.0;

/// Authenticated JSON client for the Guilded REST API.
pub struct RestClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl RestClient {
    /// Creates a client against `base` with an optional bearer token.
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
        user_agent: &str,
    ) -> ResourceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResourceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: base.into(),
            token,
        })
    }

    /// GETs `path` and returns the response body, retrying rate limits and
    /// 5xx responses up to [`MAX_TRIES`] attempts.
    pub async fn get_json(&self, path: &str) -> ResourceResult<Value> {
        let url = format!("{}{}", self.base, path);
        let mut tries = 0;

        loop {
            tries += 1;
            let mut request = self.http.get(&url);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| ResourceError::Transport(e.to_string()))?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| ResourceError::Malformed(e.to_string()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS && tries < MAX_TRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<f64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                warn!(%url, retry_after, tries, "Rate limited, sleeping before retry");
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            if status.is_server_error() && tries < MAX_TRIES {
                let delay = Duration::from_secs(1 + u64::from(tries) * 2);
                warn!(
                    %url,
                    status = status.as_u16(),
                    delay_secs = delay.as_secs(),
                    "Server error, sleeping before retry"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), "Request failed");
            return Err(match status.as_u16() {
                403 => ResourceError::Forbidden {
                    path: path.to_string(),
                },
                404 => ResourceError::NotFound {
                    path: path.to_string(),
                },
                code if status.is_server_error() => ResourceError::ServerError {
                    status: code,
                    message,
                },
                code => ResourceError::HttpStatus {
                    status: code,
                    message,
                },
            });
        }
    }

    async fn get_wrapped(&self, path: &str, key: &'static str) -> ResourceResult<Value> {
        let body = self.get_json(path).await?;
        unwrap_key(body, key)
    }
}

/// Peels the single-key wrapper (`{"server": {...}}` and friends) the API
/// puts around every entity response.
fn unwrap_key(mut body: Value, key: &'static str) -> ResourceResult<Value> {
    match body.get_mut(key) {
        Some(inner) => Ok(inner.take()),
        None => Err(ResourceError::Malformed(format!(
            "response missing `{key}` key"
        ))),
    }
}

#[async_trait]
impl ResourceClient for RestClient {
    async fn fetch_server(&self, server_id: &str) -> ResourceResult<Value> {
        self.get_wrapped(&format!("/servers/{server_id}"), "server")
            .await
    }

    async fn fetch_channel(&self, channel_id: &str) -> ResourceResult<Value> {
        self.get_wrapped(&format!("/channels/{channel_id}"), "channel")
            .await
    }

    async fn fetch_member(&self, server_id: &str, user_id: &str) -> ResourceResult<Value> {
        self.get_wrapped(&format!("/servers/{server_id}/members/{user_id}"), "member")
            .await
    }

    async fn fetch_user(&self, user_id: &str) -> ResourceResult<Value> {
        self.get_wrapped(&format!("/users/{user_id}"), "user").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_key_peels_wrapper() {
        let body = json!({"server": {"id": "S1", "name": "home"}});
        let inner = unwrap_key(body, "server").unwrap();
        assert_eq!(inner["id"], "S1");
    }

    #[test]
    fn test_unwrap_key_missing_is_malformed() {
        let body = json!({"channel": {"id": "C1"}});
        assert!(matches!(
            unwrap_key(body, "server"),
            Err(ResourceError::Malformed(_))
        ));
    }
}
