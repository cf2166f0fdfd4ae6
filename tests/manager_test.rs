//! Scenario tests for the multi-server manager's blocking facade (spec §4.5).

mod support;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use mcp_core::bridge::AwaitBridge;
use mcp_core::connection::PREFERRED_PROTOCOL_VERSION;
use mcp_core::manager::TransportFactory;
use mcp_core::{ClientError, ConnectionManager, ServerConfig, Transport};
use support::{test_client_config, test_server_config, MockTransport};

/// A factory that hands out one [`MockTransport`] per server name and keeps
/// every handle around so the test thread can drive each one's handshake.
struct RecordingFactory {
    handles: Mutex<HashMap<String, support::MockTransportHandle>>,
}

impl RecordingFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Poll until the manager has built a transport for `name`, then take
    /// its handle. Avoids a flat sleep racing against the background
    /// `spawn_blocking` task that triggers construction.
    async fn take_handle(&self, name: &str) -> support::MockTransportHandle {
        loop {
            if let Some(handle) = self.handles.lock().unwrap().remove(name) {
                return handle;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl TransportFactory for RecordingFactory {
    fn build(&self, config: &ServerConfig) -> Arc<dyn Transport> {
        let (transport, handle) = MockTransport::pair();
        self.handles
            .lock()
            .unwrap()
            .insert(config.name.clone(), handle);
        transport
    }
}

/// `ensure_connected` on the blocking facade drives a real handshake to
/// completion on a background thread while the test thread answers it.
#[tokio::test(flavor = "multi_thread")]
async fn blocking_facade_completes_a_real_handshake() {
    let factory = RecordingFactory::new();
    let servers = vec![test_server_config("alpha", Duration::from_secs(5))];
    let manager = Arc::new(ConnectionManager::new(
        servers,
        test_client_config(),
        factory.clone(),
        AwaitBridge::current(),
    ));

    let manager_for_blocking = manager.clone();
    let connect_task =
        tokio::task::spawn_blocking(move || manager_for_blocking.ensure_connected("alpha"));

    let mut handle = factory.take_handle("alpha").await;
    let init_request = handle.recv_outbound().await.unwrap();
    let id = init_request.get("id").cloned().unwrap();
    handle.push_message(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"protocolVersion": PREFERRED_PROTOCOL_VERSION, "serverInfo": {"name": "alpha-srv", "version": "9"}, "capabilities": {}}
    }));
    handle.recv_outbound().await; // notifications/initialized

    let conn = connect_task.await.unwrap().expect("connect should succeed");
    assert_eq!(
        conn.server_info().await.unwrap().name,
        "alpha-srv"
    );

    // A second call reuses the now-Ready connection without building a new
    // transport.
    let manager_again = manager.clone();
    let reused =
        tokio::task::spawn_blocking(move || manager_again.ensure_connected("alpha"))
            .await
            .unwrap()
            .unwrap();
    assert_eq!(Arc::as_ptr(&reused), Arc::as_ptr(&conn));
}

/// An unknown server name is a configuration error, not a hang or panic.
#[tokio::test]
async fn unknown_server_name_is_a_configuration_error() {
    let factory = RecordingFactory::new();
    let manager = ConnectionManager::new(
        vec![],
        test_client_config(),
        factory,
        AwaitBridge::current(),
    );

    let result = tokio::task::spawn_blocking(move || manager.ensure_connected("missing"))
        .await
        .unwrap();
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

/// `disconnect_all` tears down every live connection and is safe to call
/// with none at all.
#[tokio::test]
async fn disconnect_all_is_a_no_op_with_nothing_connected() {
    let factory = RecordingFactory::new();
    let manager = ConnectionManager::new(
        vec![test_server_config("alpha", Duration::from_secs(5))],
        test_client_config(),
        factory,
        AwaitBridge::current(),
    );

    let result = tokio::task::spawn_blocking(move || manager.disconnect_all())
        .await
        .unwrap();
    assert!(result.is_ok());
}
