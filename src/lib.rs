//! LibrasController Client Library
//!
//! This library provides a resilient client for the LibrasController gesture
//! detection server. It keeps a single WebSocket connection alive across
//! transient failures (heartbeat pings, capped exponential backoff), and
//! routes the server's JSON replies (camera lists, gesture bindings, live
//! frames) to application handlers.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod reconnect;
pub mod server_uri;
pub mod timer;
pub mod transport;
pub mod view;

pub use client::{
    Client, ClientBuilder, ClientConfig, ClientSnapshot, ConnectionState, LifecycleEvent,
};
pub use dispatcher::{
    dispatch, ChannelHandler, DefaultHandler, DispatchReport, Inbound, MessageHandler,
    StatusUpdate,
};
pub use error::{Error, Result};
pub use protocol::{GestureBinding, GestureDefinition, OutboundCommand, FRAME_UNAVAILABLE};
pub use reconnect::{ReconnectContext, ReconnectDecision, ReconnectPolicy};
pub use server_uri::ServerUri;
pub use transport::{Connector, Socket, WsConnector};
pub use view::{FrameDisplay, ViewHandler, ViewState};

/// Default port of the detection server's data socket
pub const DEFAULT_PORT: u16 = 8765;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Default heartbeat interval in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay of the first reconnect attempt in milliseconds
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// Default cap of the backoff multiplier
pub const DEFAULT_MAX_BACKOFF_FACTOR: u32 = 32;

/// A simple example of using the client:
///
/// ```rust,no_run
/// use librascli::{Client, ConnectionState};
/// use tokio::time::{sleep, Duration};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Create the client
/// let client = Client::builder()
///     .server_uri("ws://localhost:8765")?
///     .max_reconnect_attempts(5)
///     .heartbeat_interval(10_000)
///     .build();
///
/// // Connect and wait for the socket to open
/// client.connect().await?;
/// client.wait_for_state(ConnectionState::Open).await?;
///
/// // Ask for the cameras and start detecting
/// client.send_get_available_cameras();
/// client.send_start_detection();
///
/// // Keep the client running
/// sleep(Duration::from_secs(60)).await;
///
/// // Disconnect when done
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[doc(hidden)]
pub struct Examples;
