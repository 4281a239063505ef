use thiserror::Error;

/// Result type for LibrasController client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the LibrasController client
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server URI could not be parsed
    #[error("Invalid server URI: {0}")]
    InvalidUri(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Websocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Inbound payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Send attempted while the connection is not open
    #[error("Send rejected: {0}")]
    SendRejected(String),

    /// Reconnect budget used up
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts made
        attempts: u32,
    },

    /// The client event loop is no longer running
    #[error("Client event loop has shut down")]
    Shutdown,
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUri(err.to_string())
    }
}
