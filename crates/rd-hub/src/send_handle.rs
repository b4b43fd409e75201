//! Outbound event handle.
//!
//! Fire-and-forget: `send()` only confirms the envelope was queued for the
//! transport task. Nothing is buffered across reconnects.

use crate::connection::ConnectionState;
use crate::event::Envelope;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::debug;

/// Why an outbound event was not queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Connection is not up.
    NotConnected,
    /// Outbound buffer is full.
    BufferFull,
    /// Transport task has exited.
    ChannelClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::BufferFull => write!(f, "outbound buffer full"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Cloneable sender bound to one transport session.
#[derive(Clone)]
pub struct SendHandle {
    tx: mpsc::Sender<Envelope>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl SendHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Envelope>,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        Self { tx, state }
    }

    pub fn send(&self, event: &str, data: serde_json::Value) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        self.tx
            .try_send(Envelope::new(event, data))
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::BufferFull,
                TrySendError::Closed(_) => SendError::ChannelClosed,
            })?;

        debug!(event, "Event queued for sending");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected && !self.tx.is_closed()
    }
}
