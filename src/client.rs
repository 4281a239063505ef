use crate::{
    dispatcher::{self, DefaultHandler, MessageHandler},
    error::{Error, Result},
    heartbeat::HeartbeatMonitor,
    protocol::{GestureDefinition, OutboundCommand},
    reconnect::{ReconnectContext, ReconnectDecision, ReconnectPolicy},
    server_uri::ServerUri,
    transport::{Connector, TransportEvent, TransportEventKind, TransportHandle, WsConnector},
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_BACKOFF_FACTOR,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_PORT, DEFAULT_RECONNECT_BASE_DELAY_MS,
};
use log::{debug, error, info, trace, warn};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use url::Url;
use uuid::Uuid;

/// Capacity of the lifecycle event broadcast
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Optional URL path
    pub path: Option<String>,

    /// Client ID used to tag log lines (auto-generated if None)
    pub client_id: Option<Uuid>,

    /// Reconnect automatically on unintended disconnection
    pub auto_reconnect: bool,

    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnection attempt (ms)
    pub reconnect_base_delay_ms: u64,

    /// Upper bound of the backoff multiplier
    pub max_backoff_factor: u32,

    /// Heartbeat interval (ms)
    pub heartbeat_interval_ms: u64,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            path: None,
            client_id: Some(Uuid::new_v4()),
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            max_backoff_factor: DEFAULT_MAX_BACKOFF_FACTOR,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// WebSocket URL of the server
    pub fn server_url(&self) -> Result<Url> {
        ServerUri {
            host: self.host.clone(),
            port: Some(self.port),
            path: self.path.clone(),
        }
        .to_url(self.port)
    }

    /// Heartbeat interval as a duration, at least 1 ms
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Connection timeout as a duration, at least 1 s
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.max(1))
    }
}

/// Builder for creating a client
#[derive(Default)]
pub struct ClientBuilder {
    /// Client configuration
    config: ClientConfig,

    /// Socket factory, tokio-tungstenite unless overridden
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set host, port and path from a server address.
    /// Supports both bare (host:port/path) and URL (ws://host:port/path) forms
    pub fn server_uri(mut self, uri: &str) -> Result<Self> {
        let uri = ServerUri::parse(uri)?;

        self.config.host = uri.host;

        // Set port if specified
        if let Some(port) = uri.port {
            self.config.port = port;
        }

        self.config.path = uri.path;

        Ok(self)
    }

    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the URL path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = Some(path.into());
        self
    }

    /// Set the client ID
    pub fn client_id(mut self, id: Uuid) -> Self {
        self.config.client_id = Some(id);
        self
    }

    /// Enable or disable automatic reconnection
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    /// Set the reconnect budget (at least 1)
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts.max(1);
        self
    }

    /// Set the first reconnection delay
    pub fn reconnect_delay(mut self, delay_ms: u64) -> Self {
        self.config.reconnect_base_delay_ms = delay_ms;
        self
    }

    /// Set the backoff multiplier cap (at least 1)
    pub fn max_backoff_factor(mut self, factor: u32) -> Self {
        self.config.max_backoff_factor = factor.max(1);
        self
    }

    /// Set the heartbeat interval (at least 1 ms)
    pub fn heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.config.heartbeat_interval_ms = interval_ms.max(1);
        self
    }

    /// Set the connection timeout (at least 1 s)
    pub fn connection_timeout(mut self, seconds: u64) -> Self {
        self.config.connection_timeout_secs = seconds.max(1);
        self
    }

    /// Configuration built so far
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the socket factory
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the client with the default handlers
    pub fn build(self) -> Client {
        self.build_with_handler(DefaultHandler)
    }

    /// Build the client, routing inbound fields to `handler`
    pub fn build_with_handler<H: MessageHandler + 'static>(self, handler: H) -> Client {
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));
        Client::spawn(self.config, Box::new(handler), connector)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,

    /// Connecting, or waiting to reconnect
    Connecting,

    /// Connected, heartbeat running
    Open,

    /// Tearing down after close()
    Closing,

    /// Closed by the user, or reconnects exhausted
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle notification broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new transport is connecting (attempt 0 is the initial connect)
    Connecting {
        /// Reconnect attempt number
        attempt: u32,
    },

    /// The connection opened
    Opened,

    /// The connection dropped without close()
    Disconnected,

    /// The transport reported a non-fatal error
    TransportError(String),

    /// A reconnect is armed
    ReconnectScheduled {
        /// Reconnect attempt number
        attempt: u32,
        /// Delay before the attempt
        delay: Duration,
    },

    /// Reconnect budget used up; the client is closed
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// A command was dropped because the connection is not open
    SendRejected {
        /// Wire name of the dropped command
        command: &'static str,
    },

    /// An inbound payload could not be decoded
    DecodeFailed(String),

    /// The client is closed
    Closed,
}

/// Point-in-time view of the client internals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    /// Connection state
    pub state: ConnectionState,

    /// Reconnect bookkeeping
    pub reconnect: ReconnectContext,

    /// Heartbeat timer running
    pub heartbeat_running: bool,

    /// A transport handle exists
    pub transport_live: bool,

    /// A reconnect timer is armed
    pub reconnect_pending: bool,
}

/// Requests from `Client` handles to the event loop
enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
    Send(OutboundCommand),
    Snapshot(oneshot::Sender<ClientSnapshot>),
}

/// Events produced inside the event loop's own machinery
#[derive(Debug)]
enum ClientEvent {
    Transport(TransportEvent),
    HeartbeatTick { generation: u64 },
    ReconnectDue { generation: u64 },
}

impl From<TransportEvent> for ClientEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

/// Main LibrasController client.
///
/// Cheap to clone; every clone drives the same connection. The connection is
/// owned by a background task that stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client configuration
    config: Arc<ClientConfig>,

    /// Requests to the event loop
    commands: mpsc::UnboundedSender<Command>,

    /// Connection state published by the event loop
    state: watch::Receiver<ConnectionState>,

    /// Lifecycle notifications
    events: broadcast::Sender<LifecycleEvent>,
}

impl Client {
    /// Create a new client with the default handlers and connector.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        Self::spawn(config, Box::new(DefaultHandler), Arc::new(WsConnector))
    }

    /// Create a new client builder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn spawn(
        config: ClientConfig,
        handler: Box<dyn MessageHandler>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let config = Arc::new(config);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);

        let event_loop = EventLoop {
            tag: config.client_id.unwrap_or_else(Uuid::new_v4),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
            reconnect: ReconnectPolicy::new(
                ReconnectContext::new(
                    config.max_reconnect_attempts,
                    config.reconnect_base_delay_ms,
                ),
                config.max_backoff_factor,
            ),
            config: Arc::clone(&config),
            connector,
            handler,
            state: ConnectionState::Idle,
            state_tx,
            events: events_tx.clone(),
            transport: None,
            next_handle_id: 0,
            closed_by_user: false,
            internal_tx,
        };
        tokio::spawn(event_loop.run(commands_rx, internal_rx));

        Self {
            config,
            commands: commands_tx,
            state: state_rx,
            events: events_tx,
        }
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Wait until the connection state equals `target`
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::Shutdown)
    }

    /// Check if the client is connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Start connecting. Does nothing if already connecting or open.
    ///
    /// Returns once the attempt has started; watch the state or subscribe
    /// to lifecycle events to learn when it opens.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Connect(tx))?;
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Close the connection and stop reconnecting. Safe to call repeatedly.
    pub async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Close(tx))?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Internal counters and flags
    pub async fn snapshot(&self) -> Result<ClientSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Snapshot(tx))?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Send a command. Dropped with a warning if the connection is not open.
    pub fn send(&self, command: OutboundCommand) {
        if self.request(Command::Send(command)).is_err() {
            warn!("Client event loop has shut down, command dropped");
        }
    }

    /// Ask the server to start detection
    pub fn send_start_detection(&self) {
        self.send(OutboundCommand::StartDetection);
    }

    /// Ask the server to stop detection
    pub fn send_stop_detection(&self) {
        self.send(OutboundCommand::StopDetection);
    }

    /// Turn crop-hand mode on
    pub fn send_start_crop_hand_mode(&self) {
        self.send(OutboundCommand::StartCropHandMode);
    }

    /// Turn crop-hand mode off
    pub fn send_stop_crop_hand_mode(&self) {
        self.send(OutboundCommand::StopCropHandMode);
    }

    /// Request every saved binding
    pub fn send_get_all_binds(&self) {
        self.send(OutboundCommand::GetAllBinds);
    }

    /// Request one gesture
    pub fn send_get_gesture(&self, name: impl Into<String>) {
        self.send(OutboundCommand::GetGesture(name.into()));
    }

    /// Request whether a gesture can be customized
    pub fn send_get_customizable_state(&self, name: impl Into<String>) {
        self.send(OutboundCommand::GetCustomizableState(name.into()));
    }

    /// Save a gesture
    pub fn send_save_gesture(&self, gesture: GestureDefinition, overwrite: bool) {
        self.send(OutboundCommand::SaveGesture { gesture, overwrite });
    }

    /// Select the active camera
    pub fn send_set_camera(&self, name: impl Into<String>) {
        self.send(OutboundCommand::SetCamera(name.into()));
    }

    /// Request the active camera
    pub fn send_get_camera(&self) {
        self.send(OutboundCommand::GetCamera);
    }

    /// Request the available cameras
    pub fn send_get_available_cameras(&self) {
        self.send(OutboundCommand::GetAvailableCameras);
    }

    /// Request the latest frame
    pub fn send_get_frame(&self) {
        self.send(OutboundCommand::GetFrame);
    }

    fn request(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Shutdown)
    }
}

/// Owner of all connection state. Runs as a single task, so handlers and
/// timer events never interleave.
struct EventLoop {
    tag: Uuid,
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    handler: Box<dyn MessageHandler>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<LifecycleEvent>,
    transport: Option<TransportHandle>,
    next_handle_id: u64,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectPolicy,
    closed_by_user: bool,
    internal_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<ClientEvent>,
    ) {
        debug!("[{}] Starting client event loop", self.tag);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_event(event),
            }
        }

        self.teardown();
        self.set_state(ConnectionState::Closed);
        debug!("[{}] Client event loop stopped", self.tag);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let _ = reply.send(self.connect());
            }
            Command::Close(reply) => {
                self.close();
                let _ = reply.send(());
            }
            Command::Send(command) => self.send(command),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Transport(event) => self.handle_transport_event(event),
            ClientEvent::HeartbeatTick { generation } => {
                if !self.heartbeat.accepts(generation) {
                    trace!("[{}] Stale heartbeat tick #{}", self.tag, generation);
                    return;
                }
                self.heartbeat_tick();
            }
            ClientEvent::ReconnectDue { generation } => {
                if self.closed_by_user || !self.reconnect.accepts(generation) {
                    debug!("[{}] Ignoring stale reconnect timer", self.tag);
                    return;
                }
                let attempt = self.reconnect.attempt_count();
                info!("[{}] Reconnecting (attempt {})", self.tag, attempt);
                if let Err(e) = self.open_transport(attempt) {
                    error!("[{}] Cannot reconnect: {}", self.tag, e);
                    self.set_state(ConnectionState::Closed);
                }
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!("[{}] Already connected or connecting", self.tag);
                return Ok(());
            }
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => {}
        }

        self.closed_by_user = false;
        self.reconnect.reset();
        self.open_transport(0)
    }

    fn open_transport(&mut self, attempt: u32) -> Result<()> {
        let url = self.config.server_url()?;

        // Replace, never alias, the previous handle
        self.heartbeat.stop();
        if let Some(mut old) = self.transport.take() {
            old.close();
        }

        self.next_handle_id += 1;
        info!(
            "[{}] Connecting to {} (transport #{})",
            self.tag, url, self.next_handle_id
        );
        self.transport = Some(TransportHandle::open(
            self.next_handle_id,
            url,
            Arc::clone(&self.connector),
            self.config.connection_timeout(),
            self.internal_tx.clone(),
        ));
        self.set_state(ConnectionState::Connecting);
        self.notify(LifecycleEvent::Connecting { attempt });
        Ok(())
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let current = self.transport.as_ref().map(TransportHandle::id);
        if current != Some(event.handle_id) {
            trace!(
                "[{}] Discarding {:?} from stale transport #{}",
                self.tag,
                event.kind,
                event.handle_id
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.mark_open();
                    info!("[{}] Connected to {}", self.tag, transport.url());
                }
                self.reconnect.reset();
                let tick = |generation| ClientEvent::HeartbeatTick { generation };
                self.heartbeat.start(self.internal_tx.clone(), tick);
                self.set_state(ConnectionState::Open);
                self.notify(LifecycleEvent::Opened);
            }
            TransportEventKind::Message(text) => self.dispatch(&text),
            TransportEventKind::Error(detail) => {
                warn!("[{}] WebSocket error: {}", self.tag, detail);
                self.notify(LifecycleEvent::TransportError(detail));
            }
            TransportEventKind::Closed => {
                if let Some(mut transport) = self.transport.take() {
                    transport.mark_closed();
                }
                self.heartbeat.stop();
                info!("[{}] Disconnected from server", self.tag);
                self.notify(LifecycleEvent::Disconnected);
                self.try_reconnect();
            }
        }
    }

    fn try_reconnect(&mut self) {
        if self.closed_by_user {
            return;
        }

        if !self.config.auto_reconnect {
            info!("[{}] Automatic reconnection disabled", self.tag);
            self.set_state(ConnectionState::Closed);
            self.notify(LifecycleEvent::Closed);
            return;
        }

        let due = |generation| ClientEvent::ReconnectDue { generation };
        match self.reconnect.schedule(self.internal_tx.clone(), due) {
            ReconnectDecision::Scheduled { attempt, delay } => {
                info!(
                    "[{}] Reconnecting in {:?} (attempt {}/{})",
                    self.tag,
                    delay,
                    attempt,
                    self.reconnect.context().max_attempts
                );
                self.set_state(ConnectionState::Connecting);
                self.notify(LifecycleEvent::ReconnectScheduled { attempt, delay });
            }
            ReconnectDecision::Exhausted { attempts } => {
                let err = Error::ReconnectExhausted { attempts };
                error!("[{}] {}", self.tag, err);
                self.set_state(ConnectionState::Closed);
                self.notify(LifecycleEvent::ReconnectExhausted { attempts });
            }
        }
    }

    fn close(&mut self) {
        self.closed_by_user = true;
        if self.state == ConnectionState::Closed {
            debug!("[{}] Already closed", self.tag);
            self.reconnect.reset();
            return;
        }

        self.set_state(ConnectionState::Closing);
        if let Some(transport) = &self.transport {
            info!("[{}] Closing connection to {}", self.tag, transport.url());
        }
        self.teardown();
        self.reconnect.reset();
        self.set_state(ConnectionState::Closed);
        self.notify(LifecycleEvent::Closed);
    }

    /// Stop the heartbeat, disarm the reconnect timer and drop the transport
    fn teardown(&mut self) {
        self.heartbeat.stop();
        self.reconnect.cancel();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn send(&mut self, command: OutboundCommand) {
        let name = command.as_str();
        if let Err(e) = self.try_send(&command) {
            warn!(
                "[{}] WebSocket is not open, message not sent: {} ({})",
                self.tag, name, e
            );
            self.notify(LifecycleEvent::SendRejected { command: name });
        }
    }

    fn try_send(&self, command: &OutboundCommand) -> Result<()> {
        let transport = self
            .transport
            .as_ref()
            .filter(|transport| transport.is_open())
            .ok_or_else(|| Error::SendRejected(format!("connection is {}", self.state)))?;
        transport.send(command.encode()?)
    }

    fn heartbeat_tick(&self) {
        // A tick racing a disconnect is dropped silently
        match self.try_send(&OutboundCommand::Ping) {
            Ok(()) => trace!("[{}] Sent ping", self.tag),
            Err(e) => trace!("[{}] Skipped ping: {}", self.tag, e),
        }
    }

    fn dispatch(&mut self, text: &str) {
        match dispatcher::dispatch(text, self.handler.as_mut()) {
            Ok(report) => {
                if !report.failed.is_empty() {
                    warn!(
                        "[{}] Handlers failed for fields {:?}",
                        self.tag, report.failed
                    );
                }
            }
            Err(e) => self.notify(LifecycleEvent::DecodeFailed(e.to_string())),
        }
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.state,
            reconnect: self.reconnect.context(),
            heartbeat_running: self.heartbeat.is_running(),
            transport_live: self.transport.is_some(),
            reconnect_pending: self.reconnect.is_pending(),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("[{}] State: {} -> {}", self.tag, self.state, state);
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn notify(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
