//! Gateway error types.

use thiserror::Error;

/// Errors raised by the gateway connection and its socket.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The websocket connection could not be established.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The gateway URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The socket reached a closed or closing state.
    #[error("socket closed (code {code:?})")]
    Closed {
        /// Websocket close code, if the server sent one.
        code: Option<u16>,
    },

    /// A frame could not be written to the socket.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// The server never sent its hello within the handshake window.
    ///
    /// Fatal on the first connect; folded into backoff during reconnects.
    #[error("timed out waiting for the gateway hello")]
    HandshakeTimeout,

    /// The server rejected the handshake, e.g. for a stale resume cursor.
    ///
    /// Fatal on the first connect; during reconnects the cursor is dropped
    /// and the attempt retried fresh.
    #[error("handshake rejected: {reason}")]
    HandshakeRejected {
        /// Server-provided reason.
        reason: String,
    },

    /// Low-level socket I/O failure.
    #[error("socket I/O error: {0}")]
    Io(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
