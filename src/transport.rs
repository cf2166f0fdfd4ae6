//! Transport interface (C3).
//!
//! A transport is a duplex, message-framed channel bound to one server. The
//! core consumes exactly the operations and signals below; concrete
//! transports (child-process stdio pipes, HTTP+SSE) are out of scope here
//! and are supplied by the embedding host.
//!
//! The interface guarantees sequential delivery of inbound messages (no
//! reordering) and at-most-once delivery of each lifecycle signal per
//! connection attempt — implementors are responsible for upholding that,
//! the core only relies on it.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Signals emitted by a transport and observed by the connection engine.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One fully decoded inbound JSON value (still to be run through the
    /// codec's disambiguation rule by the engine).
    Message(Value),
    /// A non-recoverable transport fault. Must be followed by `Close`.
    Error(TransportError),
    /// The channel is no longer usable.
    Close(Option<String>),
    /// stdio-only, advisory: out-of-band diagnostic text.
    Stderr(Vec<u8>),
}

/// A duplex, message-framed channel bound to one server.
///
/// Implementors hand out their event stream via [`Transport::subscribe`],
/// which the engine calls exactly once per connection attempt, during the
/// `Connecting` state, before calling [`Transport::connect`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish the channel. Succeeds when the channel is usable for
    /// send/receive.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Hand one encoded message to the channel. Success means "accepted for
    /// transmission," not "delivered."
    async fn send(&self, message: Value) -> Result<(), TransportError>;

    /// Initiate shutdown. Idempotent; must eventually emit a `Close` event
    /// on the subscribed event stream.
    async fn close(&self);

    /// Obtain the receiving half of this transport's event stream. Called
    /// exactly once per connection attempt.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;
}
