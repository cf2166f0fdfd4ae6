//! Plain configuration data (§3). Immutable after construction; no fluent
//! builder here — that sits one layer up, out of scope for the core.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// Which kind of transport a [`ServerConfig`] describes. The concrete
/// transport implementation for either kind is out of scope; this is only
/// enough information for the embedding host to pick/construct one.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportKind {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
}

/// Configuration for one upstream MCP server. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportKind,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio {
                command: command.into(),
                args,
                env,
            },
            timeout,
        }
    }

    pub fn http(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Http {
                url: url.into(),
                headers,
            },
            timeout,
        }
    }
}

/// The client's own identity, sent as `clientInfo` in the `initialize`
/// handshake.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Client-side configuration shared across every connection a
/// [`crate::manager::ConnectionManager`] owns.
///
/// `event_sink`, `logger` (implicit — this crate just calls `tracing`
/// macros), and `definition_cache` are external collaborators: the core
/// only ever sees the narrow [`crate::events::EventSink`] trait object, a
/// plain capability `Value`, and an opaque TTL, respectively. It never
/// implements caching.
#[derive(Clone)]
pub struct ClientConfig {
    pub client_info: ClientInfo,
    pub capabilities: Value,
    pub event_sink: Option<std::sync::Arc<dyn crate::events::EventSink>>,
    pub id_prefix: String,
    pub cache_ttl: Duration,
    /// How long `DisconnectAsync` waits for the transport's `Close` signal
    /// before forcing cleanup (spec §4.4's "5 s" watchdog, exposed as a
    /// knob per the spec's Open Question #3).
    pub disconnect_watchdog: Duration,
}

impl ClientConfig {
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            client_info,
            capabilities: Value::Object(Default::default()),
            event_sink: None,
            id_prefix: String::new(),
            cache_ttl: Duration::from_secs(300),
            disconnect_watchdog: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_info", &self.client_info)
            .field("capabilities", &self.capabilities)
            .field("has_event_sink", &self.event_sink.is_some())
            .field("id_prefix", &self.id_prefix)
            .field("cache_ttl", &self.cache_ttl)
            .field("disconnect_watchdog", &self.disconnect_watchdog)
            .finish()
    }
}
