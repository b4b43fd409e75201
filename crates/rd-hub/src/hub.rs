//! Event hub facade.
//!
//! One hub per application: owns the listener registry for its whole
//! lifetime and at most one transport session at a time.

use crate::connection::{build_request, ConnectionState, HubConfig, Transport};
use crate::error::{HubResult, ListenerResult};
use crate::event::HubEvent;
use crate::listeners::{listener, typed, ListenerRegistry, Subscription};
use crate::send_handle::SendHandle;
use parking_lot::{Mutex, RwLock};
use rd_core::storage::{KeyValueStore, KEY_AUTH_TOKEN};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of [`EventHub::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    Connected,
    /// The transport gave up; the application keeps running without
    /// real-time updates.
    Degraded(String),
}

impl ConnectStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

struct Session {
    handle: SendHandle,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct EventHub {
    config: HubConfig,
    storage: Arc<dyn KeyValueStore>,
    listeners: Arc<ListenerRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    last_error: Arc<RwLock<Option<String>>>,
    session: Mutex<Option<Session>>,
}

impl EventHub {
    pub fn new(config: HubConfig, storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            storage,
            listeners: Arc::new(ListenerRegistry::new()),
            state: Arc::new(state),
            last_error: Arc::new(RwLock::new(None)),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Open the push connection.
    ///
    /// Returns `Err` only when the endpoint or token cannot form a valid
    /// handshake request. Otherwise resolves once the transport is connected
    /// or has exhausted its reconnection attempts.
    pub async fn connect(&self) -> HubResult<ConnectStatus> {
        // Check and install under one lock so concurrent callers share a session
        let mut status_rx = {
            let mut session = self.session.lock();
            if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
                warn!(
                    state = %self.state(),
                    "connect() called while a session is active, keeping existing connection"
                );
                return Ok(self.status());
            }

            let token = self
                .storage
                .get(KEY_AUTH_TOKEN)
                .filter(|token| !token.is_empty());
            build_request(&self.config.url, token.as_deref())?;

            let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer.max(1));
            let shutdown = CancellationToken::new();
            let status_rx = self.state.subscribe();

            *self.last_error.write() = None;
            self.state.send_replace(ConnectionState::Connecting);

            let transport = Transport::new(
                self.config.clone(),
                token,
                self.listeners.clone(),
                self.state.clone(),
                self.last_error.clone(),
                shutdown.clone(),
            );
            let task = tokio::spawn(transport.run(outbound_rx));

            *session = Some(Session {
                handle: SendHandle::new(outbound_tx, self.state.clone()),
                shutdown,
                task,
            });
            status_rx
        };

        loop {
            let state = *status_rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(ConnectStatus::Connected),
                ConnectionState::Disconnected => {
                    let status = self.degraded();
                    warn!(?status, "Event hub unavailable");
                    return Ok(status);
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if status_rx.changed().await.is_err() {
                return Ok(self.degraded());
            }
        }
    }

    /// Close the connection and wait for the transport to stop.
    ///
    /// Registrations persist; a later `connect()` resumes delivery to them.
    pub async fn disconnect(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            debug!("disconnect() without an active session");
            self.state.send_replace(ConnectionState::Disconnected);
            return;
        };

        session.shutdown.cancel();
        if let Err(e) = session.task.await {
            warn!(error = %e, "Transport task ended abnormally");
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!("Event hub disconnected");
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&self, event: HubEvent, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) -> ListenerResult + Send + Sync + 'static,
    {
        let id = self.listeners.add(event, listener(handler));
        Subscription::new(event, id, &self.listeners)
    }

    /// Register a handler that receives the payload decoded as `T`.
    ///
    /// A payload that does not decode counts as a failed invocation.
    pub fn subscribe_typed<T, F>(&self, event: HubEvent, handler: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = self.listeners.add(event, typed(handler));
        Subscription::new(event, id, &self.listeners)
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: HubEvent) -> usize {
        self.listeners.count(event)
    }

    /// Deliver `payload` to the local listeners of `event` as if it had
    /// arrived on the connection. Returns how many listeners succeeded.
    pub fn deliver(&self, event: HubEvent, payload: &serde_json::Value) -> usize {
        self.listeners.dispatch(event, payload)
    }

    /// Emit an event to the server. Dropped with a warning when not
    /// connected.
    pub fn send(&self, event: &str, payload: serde_json::Value) {
        let session = self.session.lock();
        let Some(session) = session.as_ref() else {
            warn!(event, "Push connection not open, dropping outbound event");
            return;
        };
        if let Err(e) = session.handle.send(event, payload) {
            warn!(event, error = %e, "Dropping outbound event");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn status(&self) -> ConnectStatus {
        if self.is_connected() {
            ConnectStatus::Connected
        } else {
            self.degraded()
        }
    }

    fn degraded(&self) -> ConnectStatus {
        ConnectStatus::Degraded(
            self.last_error()
                .unwrap_or_else(|| "push connection unavailable".to_string()),
        )
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown.cancel();
        }
    }
}
