//! WebSocket implementation of the realtime channel
//!
//! One background task owns the socket. It connects, announces the session
//! identity with `setup`, then forwards outbound frames and decodes inbound
//! ones until the transport drops. After a drop it reconnects with backoff
//! and reports the channel stale once the attempts run out.

use super::backoff::ReconnectPolicy;
use super::channel::{
    ChannelConnector, ChannelEnvelope, ChannelError, ChannelEvent, ChannelId, ConnectionState,
    EventSink, RealtimeChannel,
};
use super::protocol::{ClientEvent, ServerEvent};
use crate::config::RealtimeConfig;
use crate::state::SessionIdentity;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long `close` waits for the socket task before aborting it
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Rewrite an endpoint to a WebSocket URL
///
/// `http(s)://` endpoints map to `ws(s)://`; anything else but `ws(s)://`
/// is rejected.
pub fn normalize_endpoint(endpoint: &str) -> Result<String, ChannelError> {
    let endpoint = endpoint.trim();
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| ChannelError::InvalidEndpoint(endpoint.to_string()))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        _ => return Err(ChannelError::InvalidEndpoint(endpoint.to_string())),
    };
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ChannelError::InvalidEndpoint(endpoint.to_string()));
    }

    Ok(format!("{}://{}", scheme, rest))
}

/// Opens [`WebSocketChannel`]s to a fixed endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
    policy: ReconnectPolicy,
}

impl WebSocketConnector {
    /// Create a connector for an endpoint and reconnect policy
    pub fn new(endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy,
        }
    }

    /// Create a connector from the realtime configuration
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.endpoint.clone(), ReconnectPolicy::from(config))
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn open(
        &self,
        identity: SessionIdentity,
        events: EventSink,
    ) -> Result<Arc<dyn RealtimeChannel>, ChannelError> {
        let url = normalize_endpoint(&self.endpoint)?;
        let id = Uuid::new_v4();
        let connected = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ConnectionTask {
            id,
            url,
            identity,
            policy: self.policy,
            events,
            connected: connected.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        task.report(ChannelEvent::State(ConnectionState::Connecting));

        info!(channel_id = %id, endpoint = %task.url, "Opening realtime channel");
        let handle = tokio::spawn(task.run());

        Ok(Arc::new(WebSocketChannel {
            id,
            connected,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(handle)),
        }))
    }
}

/// Handle to a socket task
pub struct WebSocketChannel {
    id: ChannelId,
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), ChannelError> {
        if *self.shutdown.borrow() {
            return Err(ChannelError::Closed);
        }
        if !self.is_connected() {
            warn!(channel_id = %self.id, event = event.name(), "Refusing to emit while disconnected");
            return Err(ChannelError::NotConnected);
        }

        let text = serde_json::to_string(&event).map_err(|e| {
            error!(channel_id = %self.id, error = %e, "Failed to encode event");
            ChannelError::Closed
        })?;
        debug!(channel_id = %self.id, event = event.name(), "Emitting event");
        self.outbound.send(text).map_err(|_| ChannelError::Closed)
    }

    async fn close(&self) {
        self.shutdown.send_replace(true);
        self.connected.store(false, Ordering::SeqCst);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, handle).await.is_err() {
                warn!(channel_id = %self.id, "Socket task did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

struct ConnectionTask {
    id: ChannelId,
    url: String,
    identity: SessionIdentity,
    policy: ReconnectPolicy,
    events: EventSink,
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
}

// Resolves once shutdown is requested or the channel handle is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl ConnectionTask {
    fn report(&self, event: ChannelEvent) {
        // The owner may already be gone; nothing to do then
        let _ = self.events.send(ChannelEnvelope {
            channel_id: self.id,
            event,
        });
    }

    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let attempt = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            };

            match attempt {
                Ok((socket, _)) => {
                    failures = 0;
                    match self.session(socket).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(reason) => {
                            warn!(channel_id = %self.id, reason = %reason, "Realtime connection lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(channel_id = %self.id, error = %e, "Realtime connection attempt failed");
                }
            }

            failures += 1;
            if !self.policy.allows(failures) {
                warn!(
                    channel_id = %self.id,
                    attempts = self.policy.max_attempts,
                    "Reconnect attempts exhausted, channel is stale"
                );
                self.report(ChannelEvent::State(ConnectionState::Stale));
                return;
            }

            let delay = self.policy.delay(failures - 1);
            info!(
                channel_id = %self.id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            self.report(ChannelEvent::State(ConnectionState::Reconnecting {
                attempt: failures,
            }));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => break,
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        self.report(ChannelEvent::State(ConnectionState::Closed));
        info!(channel_id = %self.id, "Realtime channel closed");
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        let setup = match serde_json::to_string(&ClientEvent::Setup(self.identity.clone())) {
            Ok(text) => text,
            Err(e) => return SessionEnd::Lost(format!("failed to encode setup: {}", e)),
        };
        if let Err(e) = write.send(Message::Text(setup)).await {
            return SessionEnd::Lost(format!("failed to send setup: {}", e));
        }

        // Drop anything queued while the previous transport was going down
        while self.outbound.try_recv().is_ok() {}

        self.connected.store(true, Ordering::SeqCst);
        self.report(ChannelEvent::State(ConnectionState::Connected));
        info!(channel_id = %self.id, "Realtime channel connected");

        let end = loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
                Some(text) = self.outbound.recv() => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        break SessionEnd::Lost(e.to_string());
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Close(_))) => {
                        break SessionEnd::Lost("closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break SessionEnd::Lost(e.to_string()),
                    None => break SessionEnd::Lost("stream ended".to_string()),
                },
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        end
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => self.report(ChannelEvent::Server(event)),
            Err(e) => {
                warn!(channel_id = %self.id, error = %e, "Ignoring undecodable frame");
            }
        }
    }
}
