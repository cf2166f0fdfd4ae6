//! Error taxonomy for the MCP client core.
//!
//! One closed enum covers every kind from the spec: static misconfiguration,
//! connection lifecycle failure, transport I/O faults, server-reported
//! JSON-RPC errors, protocol/codec violations, await-bridge timeouts, and
//! internal misuse. Server-originated errors preserve `code`/`message`/`data`
//! verbatim; everything else is a Rust-side `String` reason.

use serde_json::Value;

/// Every error the core can surface to a caller.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ClientError {
    /// Static misconfiguration: unknown server name, missing required config.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lifecycle failure: handshake failed, transport closed unexpectedly,
    /// invalid state transition, or a connect attempt was cancelled.
    #[error("connection error: {0}")]
    Connection(String),

    /// Lower-layer I/O fault raised synchronously from a transport operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned a JSON-RPC `error` object for a specific request.
    #[error("request failed ({code}): {message}")]
    Request {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// Malformed message or invariant violation from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The await bridge's deadline elapsed before the operation completed.
    #[error("timeout waiting for {operation}")]
    Timeout { operation: String },

    /// Catch-all for internal or misuse conditions.
    #[error("client error: {0}")]
    Client(String),
}

impl ClientError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        ClientError::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        ClientError::Connection(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ClientError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    pub fn client(msg: impl Into<String>) -> Self {
        ClientError::Client(msg.into())
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        ClientError::Timeout {
            operation: operation.into(),
        }
    }

    /// True for the terminal, non-retryable lifecycle failures (as opposed
    /// to a single request's `Request`/`Timeout` failure, which leaves the
    /// connection `Ready`).
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::Transport(_))
    }
}

/// A transport-level fault, reported by a [`crate::transport::Transport`]
/// implementation. Kept distinct from [`ClientError`] because the engine
/// wraps it into `ClientError::Transport`/`ClientError::Connection`
/// depending on where it occurred (see spec §7 propagation policy).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        TransportError(msg.into())
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e.0)
    }
}
