//! In-process fake [`mcp_core::Transport`] for scenario tests: a pair of
//! channels standing in for a real stdio/HTTP wire, plus a handle the test
//! drives directly (inject server messages, observe outbound sends, force a
//! `Close`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use mcp_core::error::TransportError;
use mcp_core::{Transport, TransportEvent};

pub struct MockTransport {
    outbound_tx: mpsc::UnboundedSender<Value>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    connect_fails: AtomicBool,
    closed: AtomicBool,
}

/// Test-side handle: inject inbound events and observe outbound sends.
pub struct MockTransportHandle {
    pub outbound_rx: mpsc::UnboundedReceiver<Value>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransportHandle {
    pub fn push_message(&self, value: Value) {
        let _ = self.event_tx.send(TransportEvent::Message(value));
    }

    pub fn push_close(&self, reason: Option<String>) {
        let _ = self.event_tx.send(TransportEvent::Close(reason));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self
            .event_tx
            .send(TransportEvent::Error(TransportError::new(message.into())));
    }

    /// Wait for the next outbound message the connection engine sent.
    pub async fn recv_outbound(&mut self) -> Option<Value> {
        self.outbound_rx.recv().await
    }
}

impl MockTransport {
    /// Build a transport plus its paired test handle.
    pub fn pair() -> (std::sync::Arc<Self>, MockTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = std::sync::Arc::new(Self {
            outbound_tx,
            event_tx: event_tx.clone(),
            event_rx: Mutex::new(Some(event_rx)),
            connect_fails: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let handle = MockTransportHandle {
            outbound_rx,
            event_tx,
        };
        (transport, handle)
    }

    /// Make the next `connect()` call fail.
    pub fn fail_next_connect(&self) {
        self.connect_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.connect_fails.swap(false, Ordering::SeqCst) {
            return Err(TransportError::new("mock connect failure"));
        }
        Ok(())
    }

    async fn send(&self, message: Value) -> Result<(), TransportError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| TransportError::new("mock transport: outbound channel closed"))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(TransportEvent::Close(None));
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("MockTransport::subscribe called more than once")
    }
}

/// Build a ready-to-use test [`mcp_core::ClientConfig`] with no event sink.
pub fn test_client_config() -> mcp_core::ClientConfig {
    mcp_core::ClientConfig::new(mcp_core::ClientInfo {
        name: "test-client".to_string(),
        version: "0.0.0-test".to_string(),
    })
}

/// Build a [`mcp_core::ServerConfig`] for a stdio server; the command/args
/// are never actually spawned since every test uses [`MockTransport`].
pub fn test_server_config(name: &str, timeout: std::time::Duration) -> mcp_core::ServerConfig {
    mcp_core::ServerConfig::stdio(name, "mock", vec![], Default::default(), timeout)
}
