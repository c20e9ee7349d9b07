//! Hub client implementation

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::events::{ClientEvent, EventListeners, ListenerId};
use crate::handlers::{HandlerRegistry, MessageHandler};
use crate::messages::{
    ClientMessage, IntoArguments, MessageEnvelope, ServerMessage, RECEIVE_MESSAGE_METHOD,
    SEND_CALLER_METHOD, SEND_MESSAGE_METHOD,
};
use crate::retry::RetryContext;
use crate::transport::{ConnectRequest, Connector, TransportSession};
use crate::webtransport::WebTransportConnector;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use url::Url;

/// Latency reported before the first round trip has been measured
pub const INITIAL_LATENCY: Duration = Duration::from_millis(200);

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the hub
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Waiting for or making a retry after a failure
    Reconnecting,
}

struct PendingPing {
    sent_at: Instant,
    waiter: Option<oneshot::Sender<Duration>>,
}

/// Owner of the current session; bumping `generation` retires the old one
#[derive(Default)]
struct Lifecycle {
    generation: u64,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Why a connected session stopped
enum SessionEnd {
    /// Local disconnect
    Shutdown,
    /// Transport dropped or went silent; eligible for reconnect
    Lost(String),
    /// Hub closed the session and asked us not to come back
    Closed(Option<String>),
}

/// Internal client state
struct ClientInner {
    config: HubConfig,
    url: Url,
    connector: Arc<dyn Connector>,

    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    connected: AtomicBool,
    latency_ms: AtomicU64,
    token: RwLock<String>,
    lifecycle: Mutex<Lifecycle>,

    // Outbound half of the live session, if any
    tx: Mutex<Option<mpsc::Sender<ClientMessage>>>,

    handlers: HandlerRegistry,
    events: Arc<EventListeners>,

    // Awaited invocations and pings, keyed by id
    pending_invocations: Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>,
    pending_pings: Mutex<HashMap<u64, PendingPing>>,

    invocation_seq: AtomicU64,
    ping_seq: AtomicU64,
}

/// Persistent hub client
///
/// Keeps one logical connection to a hub, reconnects according to the configured
/// retry policy, dispatches hub-to-client invocations to registered handlers and
/// offers fire-and-forget and awaited method calls.
/// This struct is cheaply cloneable as it uses an internal Arc. Dropping the last
/// clone shuts the session down as if `disconnect()` had been called.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
    _guard: Arc<HandleGuard>,
}

/// Shared by all handles; background tasks only hold `ClientInner`
struct HandleGuard {
    inner: Arc<ClientInner>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if self.inner.shut_down().is_some() {
            debug!("Last client handle dropped, shutting down session");
        }
    }
}

impl HubClient {
    /// Create a client that connects over WebTransport
    pub fn new(config: HubConfig) -> Result<Self> {
        Self::with_connector(config, WebTransportConnector)
    }

    /// Create a client that opens sessions through `connector`
    pub fn with_connector(config: HubConfig, connector: impl Connector) -> Result<Self> {
        let url = config.validate()?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(ClientInner {
            config,
            url,
            connector: Arc::new(connector),
            state: state_tx,
            state_rx,
            connected: AtomicBool::new(false),
            latency_ms: AtomicU64::new(INITIAL_LATENCY.as_millis() as u64),
            token: RwLock::new(String::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            tx: Mutex::new(None),
            handlers: HandlerRegistry::new(),
            events: Arc::new(EventListeners::new()),
            pending_invocations: Mutex::new(HashMap::new()),
            pending_pings: Mutex::new(HashMap::new()),
            invocation_seq: AtomicU64::new(0),
            ping_seq: AtomicU64::new(0),
        });

        let client = Self {
            _guard: Arc::new(HandleGuard {
                inner: Arc::clone(&inner),
            }),
            inner,
        };
        client.register_message_feed();
        Ok(client)
    }

    /// Forward `ReceiveMessage` text to the `MessageReceived` event
    fn register_message_feed(&self) {
        let events = Arc::clone(&self.inner.events);
        self.on(RECEIVE_MESSAGE_METHOD, move |message: String| {
            events.emit(&ClientEvent::MessageReceived(message));
        });
    }

    /// Get the configuration the client was built with
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Most recent measured round trip
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.inner.latency_ms.load(Ordering::Relaxed))
    }

    /// Replace the access token used by the next connection attempt
    ///
    /// A live session keeps the token it was opened with.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.inner.token.write() = token.into();
    }

    /// Connect to the hub
    ///
    /// Transient failures are retried according to the retry policy and only show up
    /// as state changes. Returns an error once the policy gives up, the handshake is
    /// rejected, or the client is disconnected meanwhile.
    pub async fn connect(&self) -> Result<()> {
        let (ready_tx, ready_rx) = oneshot::channel();

        {
            let mut lifecycle = self.inner.lifecycle.lock();
            let current_state = self.connection_state();
            if current_state != ConnectionState::Disconnected {
                return Err(HubError::Connection(format!(
                    "Cannot connect in state: {:?}",
                    current_state
                )));
            }

            lifecycle.generation += 1;
            let generation = lifecycle.generation;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            lifecycle.shutdown = Some(shutdown_tx);
            self.inner.apply_state(ConnectionState::Connecting);

            let inner = Arc::clone(&self.inner);
            lifecycle.task = Some(tokio::spawn(supervise(
                inner,
                generation,
                shutdown_rx,
                ready_tx,
            )));
        }

        ready_rx.await.unwrap_or(Err(HubError::Cancelled))
    }

    /// Disconnect from the hub
    ///
    /// Safe to call in any state. Pending awaited invocations fail with
    /// [`HubError::Cancelled`]; returns once the session task has released the
    /// transport.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self.inner.shut_down() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Session task panicked");
                }
            }
        }

        Ok(())
    }

    /// Handle hub invocations of `method`, passing the first argument as `T`
    ///
    /// Replaces any handler previously registered for `method`. Handlers run on the
    /// session task and must not block.
    pub fn on<T, F>(&self, method: &str, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(move |arguments: &[Value]| -> Result<()> {
            let first = arguments.first().cloned().unwrap_or(Value::Null);
            handler(serde_json::from_value(first)?);
            Ok(())
        });
        self.register_handler(method, handler);
    }

    /// Handle hub invocations of `method`, passing the whole argument list as `T`
    ///
    /// Use a tuple for positional arguments, e.g. `(String, u32)`.
    pub fn on_args<T, F>(&self, method: &str, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(move |arguments: &[Value]| -> Result<()> {
            handler(serde_json::from_value(Value::Array(arguments.to_vec()))?);
            Ok(())
        });
        self.register_handler(method, handler);
    }

    fn register_handler(&self, method: &str, handler: MessageHandler) {
        if self.inner.handlers.register(method, handler).is_some() {
            debug!(method, "Replaced handler");
        }
    }

    /// Stop handling hub invocations of `method`
    pub fn remove(&self, method: &str) {
        self.inner.handlers.remove(method);
    }

    /// Call a hub method without waiting for its result
    ///
    /// Never suspends. Failures, including calling while disconnected, are reported
    /// through the error event. Must be called from within a Tokio runtime.
    pub fn invoke(&self, method: &str, args: impl IntoArguments) {
        let arguments = match args.into_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                self.inner.report_invoke_failure(method, &e);
                return;
            }
        };

        if !self.is_connected() {
            self.inner
                .report_invoke_failure(method, &HubError::NotConnected);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.inner
                    .report_invoke_failure(method, &HubError::Transport(e.to_string()));
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        let method = method.to_string();
        runtime.spawn(async move {
            match inner.invoke_core(&method, arguments).await {
                Ok(_) => {}
                Err(HubError::Cancelled) => {
                    debug!(method = %method, "Fire-and-forget invocation cancelled by disconnect")
                }
                Err(e) => inner.report_invoke_failure(&method, &e),
            }
        });
    }

    /// Call a hub method and wait for its result
    ///
    /// Fails immediately with [`HubError::NotConnected`] when not connected. Use
    /// `T = ()` for methods without a result.
    pub async fn invoke_async<T: DeserializeOwned>(
        &self,
        method: &str,
        args: impl IntoArguments,
    ) -> Result<T> {
        let arguments = args.into_arguments()?;
        let value = self.inner.invoke_core(method, arguments).await?;
        serde_json::from_value(value).map_err(HubError::Serialization)
    }

    /// Send `message` to the hub's `SendCaller` method
    pub fn send_caller(&self, message: &str) {
        self.send_envelope(SEND_CALLER_METHOD, message);
    }

    /// Send `message` to the hub's `SendMessage` method
    pub fn send_message(&self, message: &str) {
        self.send_envelope(SEND_MESSAGE_METHOD, message);
    }

    fn send_envelope(&self, method: &str, message: &str) {
        match MessageEnvelope::encode(message) {
            Ok(json) => self.invoke(method, (json,)),
            Err(e) => self.inner.report_invoke_failure(method, &e),
        }
    }

    /// Broadcasting to every client is not supported
    pub fn send_message_to_all(&self, _message: &str) -> Result<()> {
        Err(HubError::NotImplemented("SendMessageToAll"))
    }

    /// Broadcasting to every client is not supported
    pub fn send_to_all(&self, _message: &str) -> Result<()> {
        Err(HubError::NotImplemented("SendToAll"))
    }

    /// Send a ping and return the round-trip time
    pub async fn ping(&self) -> Result<Duration> {
        if !self.is_connected() {
            return Err(HubError::NotConnected);
        }

        let seq = self.inner.ping_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending_pings.lock().insert(
            seq,
            PendingPing {
                sent_at: Instant::now(),
                waiter: Some(tx),
            },
        );

        if let Err(e) = self.inner.send(ClientMessage::Ping { seq }).await {
            self.inner.pending_pings.lock().remove(&seq);
            return Err(e);
        }

        match timeout(PING_TIMEOUT, rx).await {
            Ok(Ok(rtt)) => Ok(rtt),
            Ok(Err(_)) => Err(HubError::ConnectionLost),
            Err(_) => {
                self.inner.pending_pings.lock().remove(&seq);
                Err(HubError::Timeout)
            }
        }
    }

    /// Listen to every client event
    pub fn subscribe_events<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner.events.add(Arc::new(listener))
    }

    /// Called on the initial connect and after every reconnect
    pub fn on_connected<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if matches!(event, ClientEvent::Connected) {
                listener();
            }
        })
    }

    /// Called each time a connected session ends
    pub fn on_disconnected<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if matches!(event, ClientEvent::Disconnected) {
                listener();
            }
        })
    }

    /// Called with the retry number each time a reconnect attempt is scheduled
    pub fn on_reconnecting<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if let ClientEvent::Reconnecting { attempt } = event {
                listener(*attempt);
            }
        })
    }

    /// Called with failures nobody awaits, such as a failed fire-and-forget call
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if let ClientEvent::Error(message) = event {
                listener(message);
            }
        })
    }

    /// Called with the raw text of every `ReceiveMessage` push
    pub fn on_message_received<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe_events(move |event| {
            if let ClientEvent::MessageReceived(payload) = event {
                listener(payload);
            }
        })
    }

    /// Remove an event listener; returns false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove(id)
    }
}

impl ClientInner {
    /// Publish `next` and work out which event, if any, the change implies
    ///
    /// Callers hold the lifecycle lock; the event is emitted after releasing it.
    fn apply_state(&self, next: ConnectionState) -> Option<ClientEvent> {
        let previous = self.state.send_replace(next);
        self.connected
            .store(next == ConnectionState::Connected, Ordering::Release);

        if previous != next {
            debug!(?previous, ?next, "Connection state changed");
        }

        match (previous, next) {
            (previous, ConnectionState::Connected) if previous != ConnectionState::Connected => {
                Some(ClientEvent::Connected)
            }
            (ConnectionState::Connected, next) if next != ConnectionState::Connected => {
                Some(ClientEvent::Disconnected)
            }
            _ => None,
        }
    }

    /// Retire the current session and move to `Disconnected`
    ///
    /// Returns the session task, which finishes on its own once it sees the
    /// shutdown signal.
    fn shut_down(&self) -> Option<JoinHandle<()>> {
        let (task, event) = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.generation += 1;
            if let Some(shutdown) = lifecycle.shutdown.take() {
                let _ = shutdown.send(true);
            }
            let event = self.apply_state(ConnectionState::Disconnected);
            (lifecycle.task.take(), event)
        };

        self.abandon_pending(|| HubError::Cancelled);
        if let Some(event) = event {
            self.events.emit(&event);
        }
        task
    }

    /// Apply a transition on behalf of session `generation`
    ///
    /// Returns false if that session has been retired.
    fn transition(&self, generation: u64, next: ConnectionState) -> bool {
        let event = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.generation != generation {
                return false;
            }
            self.apply_state(next)
        };

        if let Some(event) = event {
            self.events.emit(&event);
        }
        true
    }

    /// Install the session's sender and enter `Connected` in one step
    ///
    /// Calls made as soon as `Connected` is observable always find the sender.
    /// Returns false, leaving no sender behind, if the session has been retired.
    fn enter_connected(&self, generation: u64, outbound: mpsc::Sender<ClientMessage>) -> bool {
        let event = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.generation != generation {
                return false;
            }
            *self.tx.lock() = Some(outbound);
            self.apply_state(ConnectionState::Connected)
        };

        if let Some(event) = event {
            self.events.emit(&event);
        }
        true
    }

    fn give_up(&self, generation: u64, message: String) {
        if self.transition(generation, ConnectionState::Disconnected) {
            error!(%message, "Giving up on hub connection");
            self.events.emit(&ClientEvent::Error(message));
        }
    }

    fn report_error(&self, message: String) {
        warn!(%message, "Hub client error");
        self.events.emit(&ClientEvent::Error(message));
    }

    fn report_invoke_failure(&self, method: &str, error: &HubError) {
        self.report_error(format!("Invocation of '{}' failed: {}", method, error));
    }

    fn record_latency(&self, rtt: Duration) {
        self.latency_ms
            .store(rtt.as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail every awaited call of the current session
    fn abandon_pending(&self, error: impl Fn() -> HubError) {
        let invocations: Vec<_> = self.pending_invocations.lock().drain().collect();
        if !invocations.is_empty() {
            debug!(count = invocations.len(), "Abandoning pending invocations");
        }
        for (_, tx) in invocations {
            let _ = tx.send(Err(error()));
        }

        // Dropping the waiters fails any `ping()` in progress
        self.pending_pings.lock().clear();
    }

    async fn open_transport(&self) -> Result<TransportSession> {
        let token = self.token.read().clone();
        let request = ConnectRequest {
            url: self.url.clone(),
            access_token: (!token.is_empty()).then_some(token),
            options: self.config.transport.clone(),
        };

        debug!(url = %self.url, "Connecting to hub");
        self.connector.connect(request).await
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        let tx = self.tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(msg).await.map_err(|_| HubError::NotConnected)
        } else {
            Err(HubError::NotConnected)
        }
    }

    async fn invoke_core(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(HubError::NotConnected);
        }

        let invocation_id = (self.invocation_seq.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_invocations
            .lock()
            .insert(invocation_id.clone(), tx);

        let started = Instant::now();
        let msg = ClientMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: method.to_string(),
            arguments,
        };
        if let Err(e) = self.send(msg).await {
            self.pending_invocations.lock().remove(&invocation_id);
            return Err(e);
        }
        debug!(method, invocation_id = %invocation_id, "Invocation sent");

        let outcome = match self.config.invocation_timeout {
            Some(limit) => match timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending_invocations.lock().remove(&invocation_id);
                    return Err(HubError::Timeout);
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(result) => {
                if result.is_ok() {
                    self.record_latency(started.elapsed());
                }
                result
            }
            // Session ended without resolving this entry
            Err(_) => Err(HubError::ConnectionLost),
        }
    }

    fn handle_message(&self, msg: ServerMessage) -> Option<SessionEnd> {
        match msg {
            ServerMessage::Invocation { target, arguments } => {
                self.dispatch(&target, &arguments);
            }
            ServerMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let Some(tx) = self.pending_invocations.lock().remove(&invocation_id) else {
                    debug!(invocation_id = %invocation_id, "Completion for unknown invocation");
                    return None;
                };
                let outcome = match error {
                    Some(message) => Err(HubError::Invocation(message)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            ServerMessage::Pong { seq } => {
                let ping = self.pending_pings.lock().remove(&seq);
                if let Some(ping) = ping {
                    let rtt = ping.sent_at.elapsed();
                    self.record_latency(rtt);
                    if let Some(waiter) = ping.waiter {
                        let _ = waiter.send(rtt);
                    }
                }
            }
            ServerMessage::Ping => {}
            ServerMessage::Close {
                error,
                allow_reconnect,
            } => {
                info!(?error, allow_reconnect, "Hub closed the session");
                return Some(if allow_reconnect {
                    SessionEnd::Lost(error.unwrap_or_else(|| "hub closed the session".into()))
                } else {
                    SessionEnd::Closed(error)
                });
            }
            ServerMessage::HandshakeOk | ServerMessage::HandshakeError { .. } => {
                warn!("Unexpected handshake message on an established session");
            }
        }
        None
    }

    fn dispatch(&self, method: &str, arguments: &[Value]) {
        let Some(handler) = self.handlers.get(method) else {
            debug!(method, "No handler registered for hub invocation");
            return;
        };

        if let Err(e) = handler(arguments) {
            self.report_error(format!("Handler for '{}' failed: {}", method, e));
        }
    }

    /// Run a connected session until it ends
    async fn drive(
        self: &Arc<Self>,
        outbound: mpsc::Sender<ClientMessage>,
        mut inbound: mpsc::Receiver<ServerMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let keepalive_task = tokio::spawn(keepalive(Arc::clone(self)));

        let server_timeout = self.config.server_timeout;
        let idle = tokio::time::sleep(server_timeout);
        tokio::pin!(idle);

        let end = loop {
            tokio::select! {
                msg = inbound.recv() => {
                    match msg {
                        Some(msg) => {
                            idle.as_mut().reset(tokio::time::Instant::now() + server_timeout);
                            if let Some(end) = self.handle_message(msg) {
                                break end;
                            }
                        }
                        None => break SessionEnd::Lost("transport closed".into()),
                    }
                }

                _ = &mut idle => {
                    break SessionEnd::Lost(format!(
                        "no message from hub within {:?}",
                        server_timeout
                    ));
                }

                _ = shutdown.changed() => break SessionEnd::Shutdown,
            }
        };

        keepalive_task.abort();

        if let SessionEnd::Shutdown = end {
            let _ = outbound.try_send(ClientMessage::Close);
        }

        // Clear the sender before abandoning so no new call can slip in between.
        // A newer session may already own the slot after a disconnect.
        let owned = {
            let mut tx = self.tx.lock();
            let owned = tx
                .as_ref()
                .is_some_and(|current| current.same_channel(&outbound));
            if owned {
                *tx = None;
            }
            owned
        };
        if owned {
            match &end {
                SessionEnd::Shutdown => self.abandon_pending(|| HubError::Cancelled),
                SessionEnd::Lost(_) | SessionEnd::Closed(_) => {
                    self.abandon_pending(|| HubError::ConnectionLost)
                }
            }
        }

        end
    }
}

/// Send pings while the session lasts
async fn keepalive(inner: Arc<ClientInner>) {
    let period = inner.config.ping_interval;
    let stale_after = inner.config.server_timeout;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        interval.tick().await;

        let seq = inner.ping_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut pending = inner.pending_pings.lock();
            pending.retain(|_, ping| ping.sent_at.elapsed() < stale_after);
            pending.insert(
                seq,
                PendingPing {
                    sent_at: Instant::now(),
                    waiter: None,
                },
            );
        }

        if let Err(e) = inner.send(ClientMessage::Ping { seq }).await {
            debug!(error = %e, "Keepalive ping failed");
            inner.pending_pings.lock().remove(&seq);
            break;
        }
    }
}

/// Connect, run, and reconnect one session until it is shut down or given up
async fn supervise(
    inner: Arc<ClientInner>,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut ready = Some(ready);
    let mut retries: u32 = 0;
    let mut cycle_started = Instant::now();

    loop {
        let attempt = tokio::select! {
            result = inner.open_transport() => result,
            _ = shutdown.changed() => return,
        };

        let reason = match attempt {
            Ok(TransportSession { outbound, inbound }) => {
                if !inner.enter_connected(generation, outbound.clone()) {
                    return;
                }
                info!(url = %inner.url, retries, "Connected to hub");
                retries = 0;
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }

                match inner.drive(outbound, inbound, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Closed(error) => {
                        let message = match error {
                            Some(error) => format!("hub closed the connection: {}", error),
                            None => "hub closed the connection".to_string(),
                        };
                        inner.give_up(generation, message);
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        warn!(%reason, "Connection to hub lost");
                        if !inner.transition(generation, ConnectionState::Reconnecting) {
                            return;
                        }
                        cycle_started = Instant::now();
                        reason
                    }
                }
            }
            Err(e) if !e.is_retryable() => {
                let message = format!("connection failed: {}", e);
                inner.give_up(generation, message.clone());
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(HubError::Connection(message)));
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, attempt = retries + 1, "Connection attempt failed");
                e.to_string()
            }
        };

        let context = RetryContext {
            previous_retry_count: retries,
            elapsed: cycle_started.elapsed(),
            retry_reason: reason,
        };
        let Some(delay) = inner.config.retry_policy.next_retry_delay(&context) else {
            let message = format!(
                "reconnect attempts exhausted after {} retries: {}",
                retries, context.retry_reason
            );
            inner.give_up(generation, message.clone());
            if let Some(ready) = ready.take() {
                let _ = ready.send(Err(HubError::Connection(message)));
            }
            return;
        };

        retries += 1;
        if !inner.transition(generation, ConnectionState::Reconnecting) {
            return;
        }
        inner
            .events
            .emit(&ClientEvent::Reconnecting { attempt: retries });
        info!(?delay, attempt = retries, "Reconnecting to hub");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}
