//! Error taxonomy for discovery and measurement.

use thiserror::Error;

use crate::session::SessionState;

/// Errors produced while discovering servers or running a measurement.
#[derive(Debug, Error)]
pub enum SpeedTestError {
    /// The discovery call itself failed (DNS, TLS, HTTP status, body).
    #[error("server discovery failed: {0}")]
    Locate(#[from] reqwest::Error),
    /// Discovery returned no candidate with both endpoint roles.
    #[error("no measurement servers available")]
    NoServers,
    /// The WebSocket handshake did not complete.
    #[error("connection failed: {0}")]
    Connection(Box<tokio_tungstenite::tungstenite::Error>),
    /// A frame could not be handed to the transport.
    #[error("send failed: {0}")]
    Send(Box<tokio_tungstenite::tungstenite::Error>),
    /// A send was attempted on a session that is not open.
    #[error("session is not open (state: {state:?})")]
    NotOpen {
        /// State the session was in when the send was attempted.
        state: SessionState,
    },
    /// The channel faulted after the session was open.
    #[error("transport channel fault: {0}")]
    Channel(Box<tokio_tungstenite::tungstenite::Error>),
    /// The forward proxy refused or garbled the tunnel handshake.
    #[error("proxy tunnel failed: {0}")]
    Proxy(String),
    /// An endpoint or proxy URL could not be parsed.
    #[error("bad service URL: {0}")]
    Url(#[from] url::ParseError),
    /// A JSON body or event could not be (de)serialized.
    #[error("serialize/deserialize error: {0}")]
    Json(#[from] serde_json::Error),
    /// Raw socket I/O failed, typically while tunneling through a proxy.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// The tungstenite error is large; box it so the enum stays small. One
// underlying type feeds three taxonomy variants, hence constructors
// instead of `From`.
impl SpeedTestError {
    pub(crate) fn connection(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SpeedTestError::Connection(Box::new(e))
    }

    pub(crate) fn send(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SpeedTestError::Send(Box::new(e))
    }

    pub(crate) fn channel(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SpeedTestError::Channel(Box::new(e))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpeedTestError>;
