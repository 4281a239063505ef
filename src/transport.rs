//! One physical WebSocket connection attempt.
//!
//! A [`TransportHandle`] is opened without blocking. A background task
//! connects through a [`Connector`], then pumps inbound text frames and
//! outbound sends until either side closes. Everything it observes is posted
//! as a [`TransportEvent`] tagged with the handle id, always in the order
//! `Opened`, `Message`*, `Closed` (with `Error` possibly before `Closed`).

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, trace, warn};
use std::{fmt, pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

/// How long a graceful close may take before the task gives up on it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Outbound half of a socket
pub type SocketSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of a socket
pub type SocketStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// An established WebSocket, split into its two halves
pub struct Socket {
    /// Frames to the server
    pub sink: SocketSink,

    /// Frames from the server
    pub stream: SocketStream,
}

impl Socket {
    /// Split a duplex WebSocket
    pub fn new<S>(socket: S) -> Self
    where
        S: Sink<Message, Error = WsError>
            + Stream<Item = std::result::Result<Message, WsError>>
            + Send
            + 'static,
    {
        let (sink, stream) = socket.split::<Message>();
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Opens sockets
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a socket to `url`
    async fn connect(&self, url: &Url) -> Result<Socket>;
}

/// Connector backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Socket> {
        let (ws, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", url, e)))?;
        trace!("Handshake with {} answered {}", url, response.status());
        Ok(Socket::new(ws))
    }
}

/// What a transport observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The socket is open
    Opened,

    /// A text frame arrived
    Message(String),

    /// A non-fatal failure; `Closed` follows
    Error(String),

    /// The socket is gone
    Closed,
}

/// Event posted by a transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Id of the handle that produced the event
    pub handle_id: u64,

    /// What happened
    pub kind: TransportEventKind,
}

/// Handle-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Connect in flight
    Connecting,

    /// Socket open, sends accepted
    Open,

    /// Closed locally or by the peer
    Closed,
}

/// Owner of exactly one connection attempt
#[derive(Debug)]
pub struct TransportHandle {
    id: u64,
    url: Url,
    state: HandleState,
    outbound: Option<UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Start connecting to `url` and return immediately.
    ///
    /// Events are posted to `events` converted through `E: From<TransportEvent>`.
    pub fn open<E>(
        id: u64,
        url: Url,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        events: UnboundedSender<E>,
    ) -> Self
    where
        E: From<TransportEvent> + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            id,
            url.clone(),
            connector,
            connect_timeout,
            events,
            outbound_rx,
        ));

        Self {
            id,
            url,
            state: HandleState::Connecting,
            outbound: Some(outbound_tx),
            task: Some(task),
        }
    }

    /// Handle id carried by every event of this handle
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Server URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether sends are accepted
    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open && self.outbound.is_some()
    }

    /// Record that the `Opened` event was observed
    pub fn mark_open(&mut self) {
        if self.state == HandleState::Connecting {
            self.state = HandleState::Open;
        }
    }

    /// Record that the `Closed` event was observed
    pub fn mark_closed(&mut self) {
        self.state = HandleState::Closed;
        self.outbound = None;
    }

    /// Queue a text frame. Rejected unless the handle is open.
    pub fn send(&self, text: String) -> Result<()> {
        if self.state != HandleState::Open {
            return Err(Error::SendRejected(format!(
                "transport #{} is {:?}",
                self.id, self.state
            )));
        }

        match &self.outbound {
            Some(tx) => tx
                .send(text)
                .map_err(|_| Error::SendRejected(format!("transport #{} task ended", self.id))),
            None => Err(Error::SendRejected(format!(
                "transport #{} is closed",
                self.id
            ))),
        }
    }

    /// Request termination. Safe to call repeatedly.
    ///
    /// An open socket is closed gracefully by its task; a connect still in
    /// flight is aborted.
    pub fn close(&mut self) {
        let was_connecting = self.state == HandleState::Connecting;
        self.state = HandleState::Closed;

        if self.outbound.take().is_some() {
            debug!("Closing transport #{} to {}", self.id, self.url);
        }

        if let Some(task) = self.task.take() {
            if was_connecting {
                task.abort();
            }
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection task: connect, then pump frames until either side closes
async fn run_socket<E>(
    id: u64,
    url: Url,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    events: UnboundedSender<E>,
    mut outbound: UnboundedReceiver<String>,
) where
    E: From<TransportEvent> + Send + 'static,
{
    let emit = |kind: TransportEventKind| {
        let _ = events.send(E::from(TransportEvent {
            handle_id: id,
            kind,
        }));
    };

    let socket = match time::timeout(connect_timeout, connector.connect(&url)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(e)) => {
            emit(TransportEventKind::Error(format!("Failed to connect: {}", e)));
            emit(TransportEventKind::Closed);
            return;
        }
        Err(_) => {
            let err = Error::Timeout(format!(
                "connecting to {} took over {:?}",
                url, connect_timeout
            ));
            emit(TransportEventKind::Error(err.to_string()));
            emit(TransportEventKind::Closed);
            return;
        }
    };

    emit(TransportEventKind::Opened);

    let Socket {
        mut sink,
        mut stream,
    } = socket;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Transport #{}: ignoring {} byte binary frame", id, data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Transport #{}: server closed ({:?})", id, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEventKind::Error(Error::from(e).to_string()));
                    break;
                }
                None => break,
            },
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        emit(TransportEventKind::Error(Error::from(e).to_string()));
                        break;
                    }
                }
                None => {
                    if let Ok(Err(e)) = time::timeout(CLOSE_GRACE, sink.close()).await {
                        warn!("Transport #{}: error closing connection: {}", id, e);
                    }
                    break;
                }
            },
        }
    }

    emit(TransportEventKind::Closed);
}
