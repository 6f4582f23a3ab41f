//! Error types shared across the library.

use thiserror::Error;

/// Errors surfaced by a [`ResourceClient`](crate::ResourceClient)
/// implementation.
///
/// The event decoder treats every variant as non-fatal: a failed lookup
/// degrades to a stub entity and dispatch continues.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// The requested entity does not exist (HTTP 404).
    #[error("resource not found: {path}")]
    NotFound {
        /// The request path that produced the 404.
        path: String,
    },

    /// The client is not permitted to view the entity (HTTP 403).
    #[error("forbidden: {path}")]
    Forbidden {
        /// The request path that produced the 403.
        path: String,
    },

    /// The API returned a server-side error after retries were exhausted.
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, if any.
        message: String,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP error {status}: {message}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, if any.
        message: String,
    },

    /// The request never reached the API (DNS, TLS, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not the JSON shape the caller expected.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result type for resource-client operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
