//! Connection engine (C4).
//!
//! Drives a single server connection through its lifecycle, multiplexes
//! concurrent outbound requests over one transport, correlates replies,
//! and routes notifications. All mutable state (status, pending-request
//! map, negotiated session) lives behind one `tokio::sync::Mutex`, giving
//! the "no two callbacks for the same connection execute concurrently"
//! guarantee from spec §5 without a hand-rolled actor mailbox. A single
//! background task is the sole reader of the transport's event stream and
//! is therefore the only place inbound events are processed.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::codec::{self, Message, RequestId};
use crate::config::{ClientConfig, ServerConfig};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::id_generator::IdGenerator;
use crate::transport::{Transport, TransportEvent};

/// The protocol version this client prefers during handshake (spec §4.4).
pub const PREFERRED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Connection lifecycle states (spec §3/§4.4). `Closed` and `Error` are
/// terminal; only `Ready` admits user requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Closing,
    Closed,
    Error,
}

impl ConnectionStatus {
    fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Closed | ConnectionStatus::Error)
    }
}

/// Server identification, populated from the `initialize` response's
/// `serverInfo`. Missing fields fall back to the spec's literal defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Negotiated session state, populated atomically once the handshake
/// succeeds (spec §3).
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub capabilities: Value,
}

type ConnectFuture = Shared<BoxFuture<'static, Result<(), ClientError>>>;
type DisconnectFuture = Shared<BoxFuture<'static, Result<(), ClientError>>>;

enum ConnectState {
    Idle,
    InFlight(ConnectFuture),
    Done(Result<(), ClientError>),
}

enum DisconnectState {
    Idle,
    InFlight(DisconnectFuture),
    Done,
}

struct Inner {
    status: ConnectionStatus,
    pending: HashMap<RequestId, oneshot::Sender<Result<Value, ClientError>>>,
    session: Option<NegotiatedSession>,
    close_waiter: Option<oneshot::Sender<()>>,
}

/// A live (or not-yet-live) connection to one MCP server.
pub struct Connection {
    name: Arc<str>,
    server_config: ServerConfig,
    client_config: ClientConfig,
    transport: Arc<dyn Transport>,
    id_gen: IdGenerator,
    inner: Mutex<Inner>,
    connect_state: Mutex<ConnectState>,
    disconnect_state: Mutex<DisconnectState>,
}

impl Connection {
    pub fn new(
        server_config: ServerConfig,
        client_config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let name: Arc<str> = Arc::from(server_config.name.as_str());
        let id_gen = IdGenerator::with_prefix(client_config.id_prefix.clone());
        Arc::new(Self {
            name,
            server_config,
            client_config,
            transport,
            id_gen,
            inner: Mutex::new(Inner {
                status: ConnectionStatus::Disconnected,
                pending: HashMap::new(),
                session: None,
                close_waiter: None,
            }),
            connect_state: Mutex::new(ConnectState::Idle),
            disconnect_state: Mutex::new(DisconnectState::Idle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server_config
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.lock().await.status
    }

    pub async fn negotiated_protocol_version(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.protocol_version.clone())
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.server_info.clone())
    }

    pub async fn server_capabilities(&self) -> Option<Value> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.capabilities.clone())
    }

    // ─── ConnectAsync ───────────────────────────────────────────────────

    /// Drive the connection to `Ready` or `Error`. Idempotent: a connect
    /// already in progress is observed by every caller via the same
    /// [`Shared`] future; calling this while `Ready` fails immediately
    /// with `ConnectionError("bad state")`.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut guard = self.connect_state.lock().await;
        match &*guard {
            ConnectState::InFlight(fut) => {
                let fut = fut.clone();
                drop(guard);
                return fut.await;
            }
            ConnectState::Done(Ok(())) => {
                // A completed connect only remains valid while status is
                // still Ready; otherwise a fresh attempt is required and
                // bad-state applies per the transition table.
                let status = self.inner.lock().await.status;
                if status == ConnectionStatus::Ready {
                    return Ok(());
                }
            }
            _ => {}
        }

        let status = self.inner.lock().await.status;
        if !matches!(
            status,
            ConnectionStatus::Disconnected | ConnectionStatus::Closed | ConnectionStatus::Error
        ) {
            return Err(ClientError::connection("bad state"));
        }

        let this = Arc::clone(self);
        let fut: BoxFuture<'static, Result<(), ClientError>> =
            Box::pin(async move { this.run_connect().await });
        let shared = fut.shared();
        *guard = ConnectState::InFlight(shared.clone());
        drop(guard);

        let result = shared.await;
        *self.connect_state.lock().await = ConnectState::Done(result.clone());
        result
    }

    /// Cancel an in-flight connect attempt: transitions to `Error` and
    /// closes the transport if still mid-connect/handshake (spec §4.4's
    /// cancellation row). A no-op outside `Connecting`/`Handshaking` — in
    /// particular, a connection that has already reached `Ready` (or is
    /// already terminal) is not a valid target for `ConnectAsync`
    /// cancellation and must not be forced into `Error`.
    pub async fn cancel_connect(self: &Arc<Self>) {
        self.fail_if_connecting(ClientError::connection("cancelled"))
            .await;
    }

    async fn run_connect(self: Arc<Self>) -> Result<(), ClientError> {
        {
            let mut inner = self.inner.lock().await;
            inner.status = ConnectionStatus::Connecting;
        }

        let rx = self.transport.subscribe();
        let loop_owner = Arc::clone(&self);
        tokio::spawn(async move { loop_owner.run_event_loop(rx).await });

        if let Err(e) = self.transport.connect().await {
            let err = ClientError::from(e);
            self.handle_transport_failure(err.clone()).await;
            return Err(err);
        }

        {
            let mut inner = self.inner.lock().await;
            inner.status = ConnectionStatus::Handshaking;
        }

        let init_params = serde_json::json!({
            "protocolVersion": PREFERRED_PROTOCOL_VERSION,
            "capabilities": self.client_config.capabilities,
            "clientInfo": {
                "name": self.client_config.client_info.name,
                "version": self.client_config.client_info.version,
            }
        });
        let id = self.id_gen.next();
        let result = match self.send_request_internal(id, "initialize", Some(init_params)).await {
            Ok(v) => v,
            Err(e) => {
                self.handle_transport_failure(e.clone()).await;
                return Err(e);
            }
        };

        let remote_protocol = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if remote_protocol.is_empty() {
            let err = ClientError::connection("server returned an empty protocolVersion");
            self.handle_transport_failure(err.clone()).await;
            return Err(err);
        }
        if remote_protocol != PREFERRED_PROTOCOL_VERSION {
            tracing::warn!(
                server = %self.name,
                preferred = PREFERRED_PROTOCOL_VERSION,
                remote = %remote_protocol,
                "MCP server negotiated a different protocol version; accepting it"
            );
        }

        let server_info_value = result.get("serverInfo");
        let name_field = server_info_value
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "Unknown Server".to_string());
        let version_field = server_info_value
            .and_then(|v| v.get("version"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "Unknown Version".to_string());
        let capabilities = result
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        {
            let mut inner = self.inner.lock().await;
            inner.session = Some(NegotiatedSession {
                protocol_version: remote_protocol,
                server_info: ServerInfo {
                    name: name_field,
                    version: version_field,
                },
                capabilities,
            });
        }

        let notif = Message::notification("notifications/initialized", Some(serde_json::json!({})));
        if let Err(e) = self.transport.send(codec::encode(&notif)).await {
            let err = ClientError::from(e);
            self.handle_transport_failure(err.clone()).await;
            return Err(err);
        }

        {
            let mut inner = self.inner.lock().await;
            inner.status = ConnectionStatus::Ready;
        }

        tracing::debug!(server = %self.name, "MCP connection ready");
        Ok(())
    }

    // ─── SendAsync ──────────────────────────────────────────────────────

    /// Submit a request and await the server's reply. `check_status`
    /// guards against sending while not `Ready`; notifications cannot be
    /// expressed through this entry point — it only ever constructs a
    /// JSON-RPC *request* (an id is always present), so the spec's
    /// "reject notification sends" rule holds by construction rather than
    /// a runtime check.
    pub async fn send_async(
        self: &Arc<Self>,
        method: impl Into<String>,
        params: Option<Value>,
        check_status: bool,
    ) -> Result<Value, ClientError> {
        if check_status {
            let status = self.inner.lock().await.status;
            if status != ConnectionStatus::Ready {
                return Err(ClientError::client(format!(
                    "cannot send request: connection is {status:?}, not Ready"
                )));
            }
        }
        let id = self.id_gen.next();
        self.send_request_internal(id, method.into(), params).await
    }

    /// Cancel a specific in-flight request: removes its pending entry and
    /// fails the caller with `ClientError("cancelled")`. Any later-arriving
    /// matching response is then dropped with a warning (no entry to
    /// resolve).
    pub async fn cancel_request(&self, id: &RequestId) {
        let mut inner = self.inner.lock().await;
        if let Some(tx) = inner.pending.remove(id) {
            let _ = tx.send(Err(ClientError::client("cancelled")));
        }
    }

    async fn send_request_internal(
        self: &Arc<Self>,
        id: RequestId,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            inner.pending.insert(id.clone(), tx);
        }

        let msg = Message::request(id.clone(), method, params);
        if let Err(e) = self.transport.send(codec::encode(&msg)).await {
            let mut inner = self.inner.lock().await;
            inner.pending.remove(&id);
            return Err(ClientError::from(e));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::connection("closing")),
        }
    }

    // ─── DisconnectAsync ────────────────────────────────────────────────

    /// Idempotent teardown: rejects every outstanding pending request with
    /// `ConnectionError("closing")`, closes the transport, and waits (up to
    /// the configured watchdog) for its `Close` signal before forcing the
    /// state to `Closed`.
    pub async fn disconnect(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut guard = self.disconnect_state.lock().await;
        match &*guard {
            DisconnectState::InFlight(fut) => {
                let fut = fut.clone();
                drop(guard);
                return fut.await;
            }
            DisconnectState::Done => return Ok(()),
            DisconnectState::Idle => {}
        }

        let status = self.inner.lock().await.status;
        if status.is_terminal() {
            *guard = DisconnectState::Done;
            return Ok(());
        }

        let this = Arc::clone(self);
        let fut: BoxFuture<'static, Result<(), ClientError>> =
            Box::pin(async move { this.run_disconnect().await });
        let shared = fut.shared();
        *guard = DisconnectState::InFlight(shared.clone());
        drop(guard);

        let result = shared.await;
        *self.disconnect_state.lock().await = DisconnectState::Done;
        result
    }

    async fn run_disconnect(self: Arc<Self>) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            if inner.status.is_terminal() {
                return Ok(());
            }
            inner.status = ConnectionStatus::Closing;
            reject_all_pending(&mut inner.pending, ClientError::connection("closing"));
            inner.close_waiter = Some(tx);
        }

        self.transport.close().await;

        let watchdog = self.client_config.disconnect_watchdog;
        if tokio::time::timeout(watchdog, rx).await.is_err() {
            tracing::warn!(
                server = %self.name,
                "disconnect watchdog elapsed before transport close signal — forcing cleanup"
            );
        }

        let mut inner = self.inner.lock().await;
        inner.status = ConnectionStatus::Closed;
        Ok(())
    }

    // ─── Transport event handling ───────────────────────────────────────

    async fn run_event_loop(
        self: Arc<Self>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            self.handle_transport_event(event).await;
        }
    }

    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Message(value) => self.handle_inbound_message(value).await,
            TransportEvent::Error(err) => {
                self.handle_transport_failure(ClientError::from(err)).await
            }
            TransportEvent::Close(reason) => self.handle_transport_close(reason).await,
            TransportEvent::Stderr(bytes) => {
                tracing::debug!(
                    server = %self.name,
                    len = bytes.len(),
                    "MCP server stderr output"
                );
            }
        }
    }

    async fn handle_inbound_message(self: &Arc<Self>, value: Value) {
        let msg = match codec::decode(&value) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "dropping malformed MCP message");
                return;
            }
        };

        match msg {
            Message::Response { id, result, error } => {
                let sender = {
                    let mut inner = self.inner.lock().await;
                    inner.pending.remove(&id)
                };
                match sender {
                    Some(tx) => {
                        let outcome = match error {
                            Some(e) => Err(ClientError::Request {
                                code: e.code,
                                message: e.message,
                                data: e.data,
                            }),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        // The pending entry is left in place across an await-bridge
                        // timeout (spec: "late reply then dropped with warning"), so
                        // a reply can still find it here after its caller gave up —
                        // `send` then fails because the receiver was already dropped.
                        if tx.send(outcome).is_err() {
                            tracing::warn!(
                                server = %self.name,
                                id = %id,
                                "dropping late reply: caller already stopped waiting"
                            );
                        }
                    }
                    None => {
                        tracing::warn!(
                            server = %self.name,
                            id = %id,
                            "dropping response with no matching pending request"
                        );
                    }
                }
            }
            Message::Notification { method, params } => {
                self.dispatch_notification(method, params).await;
            }
            Message::Request { method, .. } => {
                tracing::warn!(
                    server = %self.name,
                    method = %method,
                    "dropping unsupported inbound server-to-client request"
                );
            }
        }
    }

    async fn dispatch_notification(self: &Arc<Self>, method: String, params: Option<Value>) {
        let server = self.name.to_string();
        let event = match method.as_str() {
            "notifications/tools/listChanged" => Some(ClientEvent::ToolsListChanged { server }),
            "notifications/resources/listChanged" => {
                Some(ClientEvent::ResourcesListChanged { server })
            }
            "notifications/prompts/listChanged" => {
                Some(ClientEvent::PromptsListChanged { server })
            }
            "notifications/resources/didChange" => {
                let uri = params
                    .as_ref()
                    .and_then(|p| p.get("uri"))
                    .and_then(Value::as_str)
                    .map(String::from);
                Some(ClientEvent::ResourceChanged { server, uri })
            }
            "notifications/logging/log" => Some(ClientEvent::LogReceived { server, params }),
            "sampling/createMessage" => {
                Some(ClientEvent::SamplingRequestReceived { server, params })
            }
            other => {
                tracing::warn!(server = %self.name, method = other, "unhandled MCP notification method");
                None
            }
        };

        let Some(event) = event else { return };

        match &self.client_config.event_sink {
            Some(sink) => {
                if let Err(e) = sink.dispatch(event).await {
                    tracing::warn!(server = %self.name, error = %e, "event sink failed to dispatch notification");
                }
            }
            None => {
                tracing::debug!(server = %self.name, "no event sink configured; dropping notification");
            }
        }
    }

    /// Cancellation-only variant of [`Self::handle_transport_failure`]: the
    /// precondition (`Connecting`/`Handshaking` only — the only states
    /// `ConnectAsync` cancellation applies to per spec §4.4) and the
    /// transition to `Error` happen under the same lock acquisition, so a
    /// connection that reaches `Ready` concurrently with a
    /// `cancel_connect()` call is never incorrectly forced to `Error`.
    async fn fail_if_connecting(self: &Arc<Self>, err: ClientError) {
        self.handle_transport_failure_if(
            |status| matches!(status, ConnectionStatus::Connecting | ConnectionStatus::Handshaking),
            err,
        )
        .await;
    }

    async fn handle_transport_failure(self: &Arc<Self>, err: ClientError) {
        self.handle_transport_failure_if(|status| !status.is_terminal(), err)
            .await;
    }

    async fn handle_transport_failure_if(
        self: &Arc<Self>,
        precondition: impl FnOnce(ConnectionStatus) -> bool,
        err: ClientError,
    ) {
        let mut inner = self.inner.lock().await;
        if !precondition(inner.status) {
            return;
        }
        inner.status = ConnectionStatus::Error;
        reject_all_pending(&mut inner.pending, err);
        if let Some(tx) = inner.close_waiter.take() {
            let _ = tx.send(());
        }
        drop(inner);
        self.transport.close().await;
    }

    async fn handle_transport_close(self: &Arc<Self>, reason: Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_terminal() {
            return;
        }
        if inner.status == ConnectionStatus::Closing {
            if let Some(tx) = inner.close_waiter.take() {
                let _ = tx.send(());
            }
            inner.status = ConnectionStatus::Closed;
            return;
        }

        inner.status = ConnectionStatus::Error;
        let msg = reason.unwrap_or_else(|| "transport closed unexpectedly".to_string());
        reject_all_pending(&mut inner.pending, ClientError::connection(msg));
        if let Some(tx) = inner.close_waiter.take() {
            let _ = tx.send(());
        }
    }
}

fn reject_all_pending(
    pending: &mut HashMap<RequestId, oneshot::Sender<Result<Value, ClientError>>>,
    err: ClientError,
) {
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(err.clone()));
    }
}
