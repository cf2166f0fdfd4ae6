//! Notification event variants and the event-sink collaborator interface
//! (C6, notification half).
//!
//! Inbound notifications are mapped to one of these closed variants by
//! their `method` string (see [`crate::connection`] dispatch table) and
//! handed to an [`EventSink`]. Sink failures are logged but never
//! propagate into the connection.

use serde_json::Value;

/// A translated server notification, ready for delivery to an [`EventSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ToolsListChanged {
        server: String,
    },
    ResourcesListChanged {
        server: String,
    },
    PromptsListChanged {
        server: String,
    },
    ResourceChanged {
        server: String,
        uri: Option<String>,
    },
    LogReceived {
        server: String,
        params: Option<Value>,
    },
    SamplingRequestReceived {
        server: String,
        params: Option<Value>,
    },
}

impl ClientEvent {
    pub fn server(&self) -> &str {
        match self {
            ClientEvent::ToolsListChanged { server }
            | ClientEvent::ResourcesListChanged { server }
            | ClientEvent::PromptsListChanged { server }
            | ClientEvent::ResourceChanged { server, .. }
            | ClientEvent::LogReceived { server, .. }
            | ClientEvent::SamplingRequestReceived { server, .. } => server,
        }
    }
}

/// The external collaborator that receives translated server notifications.
///
/// A single operation, matching spec §6: `Dispatch(event)`. May fail; such
/// failure is swallowed by the engine (logged at `warn!`, never surfaced to
/// a request caller).
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: ClientEvent) -> Result<(), String>;
}
