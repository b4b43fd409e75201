//! Mock push server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and record their `Authorization` header
//! - Push raw frames to every connected client
//! - Close every live connection
//! - Record received text frames

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Close,
}

#[derive(Default)]
struct Recorded {
    connections: u32,
    auth_headers: Vec<Option<String>>,
    messages: Vec<String>,
}

/// A mock push server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<Command>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockWsServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (commands, _) = broadcast::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let recorded_clone = recorded.clone();
        let commands_clone = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        // Subscribe before the handshake so no push is missed
                        let commands = commands_clone.subscribe();
                        tokio::spawn(handle_connection(stream, recorded_clone.clone(), commands));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            recorded,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push a `{"event", "data"}` envelope to every client.
    pub fn push(&self, event: &str, data: serde_json::Value) {
        let frame = serde_json::json!({ "event": event, "data": data }).to_string();
        self.push_raw(&frame);
    }

    /// Push an arbitrary text frame to every client.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.commands.send(Command::Push(frame.to_string()));
    }

    /// Close every live connection from the server side.
    pub fn close_all(&self) {
        let _ = self.commands.send(Command::Close);
    }

    pub fn connection_count(&self) -> u32 {
        self.recorded.lock().connections
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.recorded.lock().auth_headers.clone()
    }

    pub fn received_messages(&self) -> Vec<String> {
        self.recorded.lock().messages.clone()
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    recorded: Arc<Mutex<Recorded>>,
    mut commands: broadcast::Receiver<Command>,
) {
    let header_sink = recorded.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let auth = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut recorded = header_sink.lock();
        recorded.connections += 1;
        recorded.auth_headers.push(auth);
        Ok(response)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => recorded.lock().messages.push(text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            command = commands.recv() => match command {
                Ok(Command::Push(frame)) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(Command::Close) | Err(_) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
