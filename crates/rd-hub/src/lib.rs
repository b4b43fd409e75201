//! Real-time event hub for the dispatch client.
//!
//! Provides a single push connection shared by every state container:
//! - Automatic reconnection with capped exponential backoff
//! - Ordered, isolated listener dispatch per event
//! - Heartbeat monitoring (ping after silence, pong timeout detection)
//! - Fire-and-forget outbound events

pub mod connection;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod hub;
pub mod listeners;
pub mod send_handle;

pub use connection::{ConnectionState, HubConfig};
pub use error::{HubError, HubResult, ListenerError, ListenerResult};
pub use event::{Envelope, HubEvent};
pub use hub::{ConnectStatus, EventHub};
pub use listeners::{Listener, ListenerId, Subscription};
pub use send_handle::{SendError, SendHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
