//! Event hub error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// Raised synchronously by `connect()` before any network activity.
    #[error("Invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid auth token: {0}")]
    InvalidToken(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HubResult<T> = Result<T, HubError>;

/// Failure reported by a single listener invocation.
///
/// Logged by the hub; never propagated to sibling listeners.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Handler(String),
}

pub type ListenerResult = Result<(), ListenerError>;
