//! Connection manager (C5).
//!
//! Owns the `{server name -> Connection}` registry and exposes a blocking
//! facade over the async engine via [`crate::bridge::AwaitBridge`], so a
//! plain synchronous caller thread can drive multi-server MCP traffic
//! without touching `async`/`await` itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::bridge::AwaitBridge;
use crate::config::{ClientConfig, ServerConfig};
use crate::connection::{Connection, ConnectionStatus};
use crate::error::ClientError;
use crate::transport::Transport;

/// Extra headroom added to a server's configured timeout when awaiting a
/// brand-new connect attempt (spec §4.5: `serverConfig.timeout + 2s`).
const CONNECT_HEADROOM: Duration = Duration::from_secs(2);

/// Ceiling for a single-server disconnect (spec §4.5).
const DISCONNECT_CEILING: Duration = Duration::from_secs(5);

/// Ceiling for the fan-out `DisconnectAll` (spec §4.5).
const DISCONNECT_ALL_CEILING: Duration = Duration::from_secs(10);

/// Factory the manager uses to build a transport for a server it doesn't
/// yet have a live connection for. The concrete transport (stdio child
/// process, HTTP+SSE) is out of scope for the core; the manager only knows
/// how to ask for one.
pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &ServerConfig) -> Arc<dyn Transport>;
}

struct ManagedConnection {
    connection: Arc<Connection>,
}

/// Multi-server registry plus blocking facade.
pub struct ConnectionManager {
    servers: HashMap<String, ServerConfig>,
    client_config: ClientConfig,
    transport_factory: Arc<dyn TransportFactory>,
    connections: Mutex<HashMap<String, ManagedConnection>>,
    bridge: AwaitBridge,
}

impl ConnectionManager {
    pub fn new(
        servers: Vec<ServerConfig>,
        client_config: ClientConfig,
        transport_factory: Arc<dyn TransportFactory>,
        bridge: AwaitBridge,
    ) -> Self {
        Self {
            servers: servers.into_iter().map(|s| (s.name.clone(), s)).collect(),
            client_config,
            transport_factory,
            connections: Mutex::new(HashMap::new()),
            bridge,
        }
    }

    fn server_config(&self, name: &str) -> Result<&ServerConfig, ClientError> {
        self.servers
            .get(name)
            .ok_or_else(|| ClientError::configuration(format!("unknown server '{name}'")))
    }

    // ─── Async core ─────────────────────────────────────────────────────

    /// Ensure the named connection is `Ready`. See spec §4.5 for the exact
    /// state-reuse rules: a `Ready` connection is returned as-is; an
    /// in-flight attempt is awaited under the server's configured timeout;
    /// a brand-new attempt is awaited under `timeout + 2s`; any other
    /// non-terminal, non-`Ready` status is an unstable-state error.
    pub async fn ensure_connected_async(&self, name: &str) -> Result<Arc<Connection>, ClientError> {
        let server = self.server_config(name)?.clone();

        let existing = {
            let connections = self.connections.lock().await;
            connections.get(name).map(|m| Arc::clone(&m.connection))
        };

        if let Some(conn) = &existing {
            match conn.status().await {
                ConnectionStatus::Ready => return Ok(Arc::clone(conn)),
                ConnectionStatus::Connecting | ConnectionStatus::Handshaking => {
                    await_with_deadline(conn.connect(), server.timeout, "connect (in flight)")
                        .await?;
                    return Ok(Arc::clone(conn));
                }
                ConnectionStatus::Closing => {
                    return Err(ClientError::connection("unstable state"));
                }
                ConnectionStatus::Disconnected
                | ConnectionStatus::Closed
                | ConnectionStatus::Error => {
                    // Stale terminal connection: fall through and replace it.
                }
            }
        }

        let transport = self.transport_factory.build(&server);
        let conn = Connection::new(server.clone(), self.client_config.clone(), transport);
        {
            let mut connections = self.connections.lock().await;
            connections.insert(
                name.to_string(),
                ManagedConnection {
                    connection: Arc::clone(&conn),
                },
            );
        }

        await_with_deadline(conn.connect(), server.timeout + CONNECT_HEADROOM, "connect").await?;
        Ok(conn)
    }

    pub async fn send_request_and_wait_async(
        &self,
        name: &str,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        let conn = self.ensure_connected_async(name).await?;
        conn.send_async(method, params, true).await
    }

    pub async fn disconnect_async(&self, name: &str) -> Result<(), ClientError> {
        let conn = {
            let connections = self.connections.lock().await;
            connections.get(name).map(|m| Arc::clone(&m.connection))
        };
        match conn {
            Some(conn) => conn.disconnect().await,
            None => Ok(()),
        }
    }

    pub async fn disconnect_all_async(&self) -> Result<(), ClientError> {
        let conns: Vec<Arc<Connection>> = {
            let connections = self.connections.lock().await;
            connections
                .values()
                .map(|m| Arc::clone(&m.connection))
                .collect()
        };
        let results = futures_util::future::join_all(conns.iter().map(|c| c.disconnect())).await;
        for r in results {
            r?;
        }
        Ok(())
    }

    // ─── Blocking facade ────────────────────────────────────────────────

    /// Blocks the calling OS thread until the named connection is `Ready`.
    pub fn ensure_connected(&self, name: &str) -> Result<Arc<Connection>, ClientError> {
        let server = self.server_config(name)?.clone();
        let ceiling = server.timeout + CONNECT_HEADROOM + Duration::from_secs(1);
        self.bridge
            .block_on(&format!("ensure_connected({name})"), ceiling, async {
                self.ensure_connected_async(name).await
            })
    }

    /// Blocks the calling OS thread for the round trip of one request.
    pub fn send_request_and_wait(
        &self,
        name: &str,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let server = self.server_config(name)?;
        let deadline = timeout.unwrap_or(server.timeout);
        let method = method.into();
        self.bridge
            .block_on(&format!("{name}:{method}"), deadline, async {
                self.send_request_and_wait_async(name, method, params).await
            })
    }

    /// Blocks the calling OS thread for `DisconnectAsync`.
    pub fn disconnect(&self, name: &str) -> Result<(), ClientError> {
        self.bridge
            .block_on(&format!("disconnect({name})"), DISCONNECT_CEILING, async {
                self.disconnect_async(name).await
            })
    }

    /// Blocks the calling OS thread for the collective `DisconnectAsync`
    /// fan-out across every live connection.
    pub fn disconnect_all(&self) -> Result<(), ClientError> {
        self.bridge
            .block_on("disconnect_all", DISCONNECT_ALL_CEILING, async {
                self.disconnect_all_async().await
            })
    }
}

/// Await `fut` under a deadline, mapping elapsed time to `ClientError::Timeout`.
async fn await_with_deadline<T>(
    fut: impl std::future::Future<Output = Result<T, ClientError>>,
    deadline: Duration,
    operation: &str,
) -> Result<T, ClientError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::timeout(operation)),
    }
}
