//! Push connection transport.
//!
//! Owns one WebSocket session at a time: connects, pumps inbound frames to
//! the listener registry and outbound envelopes to the socket, and
//! reconnects with capped exponential backoff until the attempt budget is
//! spent or shutdown is requested.

use crate::error::{HubError, HubResult};
use crate::event::{Envelope, HubEvent};
use crate::heartbeat::Heartbeat;
use crate::listeners::ListenerRegistry;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Push connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Push endpoint (`ws://` or `wss://`).
    #[serde(default)]
    pub url: String,
    /// Reconnection attempts after a failure before giving up (0 = unbounded).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Cap on the backoff delay.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Silence after which a ping is sent.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Outbound envelopes buffered while the socket is busy.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

fn default_heartbeat_interval_ms() -> u64 {
    25_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    20_000
}

fn default_outbound_buffer() -> usize {
    64
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl HubConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Backoff before reconnection attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)` plus jitter, never above the configured cap.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnect_base_delay_ms;
        let max = self.reconnect_max_delay_ms;

        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);
        let jitter = rand_jitter(delay / 4);
        Duration::from_millis(delay.saturating_add(jitter).min(max))
    }
}

/// Jitter in `0..=bound` ms, derived from the clock's sub-second nanos.
fn rand_jitter(bound: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if bound == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (bound + 1)
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the handshake request, attaching the bearer token when present.
///
/// Fails only on a malformed endpoint or token; never touches the network.
pub(crate) fn build_request(url: &str, token: Option<&str>) -> HubResult<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| HubError::InvalidEndpoint(format!("{url}: {e}")))?;

    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => {}
        other => {
            return Err(HubError::InvalidEndpoint(format!(
                "{url}: unsupported scheme {}",
                other.unwrap_or("<none>")
            )))
        }
    }

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| HubError::InvalidToken(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}

type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Background task driving one hub connection.
pub(crate) struct Transport {
    config: HubConfig,
    token: Option<String>,
    listeners: Arc<ListenerRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    last_error: Arc<RwLock<Option<String>>>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
}

impl Transport {
    pub(crate) fn new(
        config: HubConfig,
        token: Option<String>,
        listeners: Arc<ListenerRegistry>,
        state: Arc<watch::Sender<ConnectionState>>,
        last_error: Arc<RwLock<Option<String>>>,
        shutdown: CancellationToken,
    ) -> Self {
        let heartbeat = Heartbeat::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            token,
            listeners,
            state,
            last_error,
            heartbeat,
            shutdown,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    /// Connect and keep reconnecting until shutdown or the attempt budget
    /// is spent.
    pub(crate) async fn run(self, mut outbound_rx: mpsc::Receiver<Envelope>) {
        let mut attempt = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });

            match self.try_connect(&mut outbound_rx, &mut attempt).await {
                Ok(()) => info!("Push connection closed"),
                Err(e) => {
                    error!(error = %e, "Push connection error");
                    *self.last_error.write() = Some(e.to_string());
                    self.listeners
                        .dispatch(HubEvent::Error, &json!({ "message": e.to_string() }));
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt > self.config.max_reconnect_attempts
            {
                error!(
                    attempts = self.config.max_reconnect_attempts,
                    "Max reconnection attempts reached, continuing without real-time updates"
                );
                break;
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.config.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    async fn try_connect(
        &self,
        outbound_rx: &mut mpsc::Receiver<Envelope>,
        attempt: &mut u32,
    ) -> HubResult<()> {
        let request = build_request(&self.config.url, self.token.as_deref())?;
        info!(
            url = %self.config.url,
            authenticated = self.token.is_some(),
            "Connecting to push endpoint"
        );

        let (stream, _response) = tokio::select! {
            result = connect_async_tls_with_config(request, None, true, None) => result?,
            () = self.shutdown.cancelled() => return Ok(()),
        };

        *attempt = 0;
        *self.last_error.write() = None;
        self.heartbeat.reset();
        self.set_state(ConnectionState::Connected);
        info!("Push connection established");
        self.listeners.dispatch(HubEvent::Connected, &json!({}));

        let result = self.session(stream, outbound_rx).await;

        if !self.shutdown.is_cancelled() {
            let reason = match &result {
                Ok(()) => "closed".to_string(),
                Err(e) => e.to_string(),
            };
            self.listeners
                .dispatch(HubEvent::Disconnected, &json!({ "reason": reason }));
        }

        result
    }

    async fn session(
        &self,
        stream: PushStream,
        outbound_rx: &mut mpsc::Receiver<Envelope>,
    ) -> HubResult<()> {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, closing push connection");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => self.heartbeat.record_pong(),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Push connection closed by server");
                            return Err(HubError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Push stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_rx.recv() => {
                    let Some(envelope) = outbound else {
                        // Every send handle is gone: the hub itself was dropped
                        info!("Event hub dropped, closing push connection");
                        let _ = write.send(Message::Close(None)).await;
                        self.shutdown.cancel();
                        return Ok(());
                    };
                    let text = serde_json::to_string(&envelope)?;
                    write.send(Message::Text(text)).await?;
                    debug!(
                        target: "rd_hub::events",
                        event = %envelope.event,
                        direction = "out",
                        "Event sent"
                    );
                }

                () = self.heartbeat.tick() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(HubError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        trace!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        self.heartbeat.record_message();

        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
                return;
            }
        };

        debug!(
            target: "rd_hub::events",
            event = %envelope.event,
            direction = "in",
            data = %envelope.data,
            "Event received"
        );

        match envelope.event.parse::<HubEvent>() {
            Ok(event) if event.is_lifecycle() => {
                debug!(%event, "Ignoring server-sent lifecycle event");
            }
            Ok(event) => {
                let delivered = self.listeners.dispatch(event, &envelope.data);
                trace!(%event, delivered, "Event delivered");
            }
            Err(_) => {
                debug!(event = %envelope.event, "Ignoring unrecognised event");
            }
        }
    }
}
