//! Core concurrency and protocol engine for a Model Context Protocol client.
//!
//! This crate implements the transport-agnostic machinery a client needs to
//! talk to one or more MCP servers: JSON-RPC framing, a per-connection state
//! machine with an `initialize` handshake sequencer, request/response
//! correlation, notification dispatch, and a multi-server manager that
//! exposes a blocking facade over its async interior. Concrete wire
//! transports (stdio, HTTP), the fluent config builder, the plain
//! tool/resource/prompt data model, and an embedding CLI/host all live one
//! layer up, outside this crate.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod id_generator;
pub mod manager;
pub mod transport;

pub use codec::{Message, RequestId, RpcError};
pub use config::{ClientConfig, ClientInfo, ServerConfig, TransportKind};
pub use connection::{Connection, ConnectionStatus};
pub use error::ClientError;
pub use events::{ClientEvent, EventSink};
pub use manager::{ConnectionManager, TransportFactory};
pub use transport::{Transport, TransportEvent};
