//! Authenticated real-time stream session.
//!
//! A WebSocket client that attaches the current session token as a `token`
//! query parameter, sends periodic heartbeats, and reconnects after an
//! unrequested close up to a bounded number of attempts.
//!
//! All state lives behind one lock owned by the session. A background task
//! per connection attempt is cancelled with a [`CancellationToken`] on
//! `disconnect()`, on a repeated `connect()`, and on drop.

use std::sync::Arc;
use std::time::Duration;

use edge_protocol::{EdgeError, QueryParams};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Stream session configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint; the token is appended as a query parameter.
    pub url: String,
    /// Reconnect after an unrequested close (default: true)
    pub auto_reconnect: bool,
    /// Consecutive reconnect attempts before giving up (default: 5)
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts (default: 3s)
    pub reconnect_delay: Duration,
    /// Heartbeat period while open; zero disables (default: 30s)
    pub heartbeat_interval: Duration,
    /// Heartbeat payload (default: `{"type":"ping"}`)
    pub heartbeat_message: String,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_message: r#"{"type":"ping"}"#.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token source
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies the session token for each connection attempt.
pub trait TokenSource: Send + Sync + 'static {
    fn session_token(&self) -> impl std::future::Future<Output = Result<SecretString, EdgeError>> + Send;
}

/// A fixed token.
#[derive(Debug)]
pub struct StaticTokenSource(SecretString);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

impl TokenSource for StaticTokenSource {
    async fn session_token(&self) -> Result<SecretString, EdgeError> {
        Ok(SecretString::from(self.0.expose_secret().to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State and events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Open,
}

/// Lifecycle and message events, delivered in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Opened,
    Message(String),
    Closed { clean: bool },
    Error(String),
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect attempts exhausted; the session stays disconnected.
    GaveUp { attempts: u32 },
}

struct Shared {
    state: StreamState,
    reconnect_attempts: u32,
    manual_close: bool,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

struct Worker<T> {
    id: String,
    config: StreamConfig,
    tokens: Arc<T>,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A reconnecting, token-authenticated WebSocket session.
pub struct StreamSession<T: TokenSource> {
    id: String,
    config: StreamConfig,
    tokens: Arc<T>,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    task: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl<T: TokenSource> StreamSession<T> {
    /// Create a disconnected session and its event receiver.
    pub fn new(config: StreamConfig, tokens: T) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            tokens: Arc::new(tokens),
            shared: Arc::new(Mutex::new(Shared {
                state: StreamState::Disconnected,
                reconnect_attempts: 0,
                manual_close: false,
                outbound: None,
            })),
            events,
            task: tokio::sync::Mutex::new(None),
        };
        (session, rx)
    }

    /// Create a session and connect it immediately.
    pub async fn start(config: StreamConfig, tokens: T) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (session, rx) = Self::new(config, tokens);
        session.connect().await;
        (session, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> StreamState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }

    /// Open the connection, replacing any existing one.
    pub async fn connect(&self) {
        let mut task = self.task.lock().await;
        if let Some((cancel, handle)) = task.take() {
            cancel.cancel();
            let _ = handle.await;
        }

        {
            let mut shared = self.shared.lock();
            shared.manual_close = false;
            shared.reconnect_attempts = 0;
            shared.outbound = None;
            shared.state = StreamState::Connecting;
        }

        let cancel = CancellationToken::new();
        let worker = Worker {
            id: self.id.clone(),
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());
        *task = Some((cancel, handle));
    }

    /// Close the connection. No reconnect follows.
    pub async fn disconnect(&self) {
        self.shared.lock().manual_close = true;

        let mut task = self.task.lock().await;
        if let Some((cancel, handle)) = task.take() {
            cancel.cancel();
            let _ = handle.await;
        }

        let mut shared = self.shared.lock();
        shared.state = StreamState::Disconnected;
        shared.outbound = None;
        info!("Stream {} disconnected", self.id);
    }

    /// Send a text message. Fails with `NotConnected` unless the session is open.
    pub fn send(&self, text: impl Into<String>) -> Result<(), EdgeError> {
        let shared = self.shared.lock();
        if shared.state != StreamState::Open {
            return Err(EdgeError::NotConnected);
        }
        shared
            .outbound
            .as_ref()
            .ok_or(EdgeError::NotConnected)?
            .send(Message::Text(text.into().into()))
            .map_err(|_| EdgeError::NotConnected)
    }

    /// Serialize and send a JSON message.
    pub fn send_json<M: serde::Serialize>(&self, message: &M) -> Result<(), EdgeError> {
        let text = serde_json::to_string(message).map_err(|e| EdgeError::BadRequest(e.to_string()))?;
        self.send(text)
    }
}

impl<T: TokenSource> Drop for StreamSession<T> {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.get_mut().take() {
            cancel.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

impl<T: TokenSource> Worker<T> {
    async fn run(self) {
        loop {
            if let Err(e) = self.connect_once().await {
                warn!("Stream {} connection failed: {}", self.id, e);
                let _ = self.events.send(StreamEvent::Error(e.to_string()));
            }

            {
                let mut shared = self.shared.lock();
                shared.state = StreamState::Disconnected;
                shared.outbound = None;
            }

            if self.cancel.is_cancelled() || self.shared.lock().manual_close {
                return;
            }

            let Some(attempt) = self.next_attempt() else {
                if self.config.auto_reconnect {
                    let attempts = self.shared.lock().reconnect_attempts;
                    warn!("Stream {} giving up after {} reconnect attempts", self.id, attempts);
                    let _ = self.events.send(StreamEvent::GaveUp { attempts });
                }
                return;
            };

            let delay = self.config.reconnect_delay;
            info!(
                "Stream {} reconnecting in {:?} (attempt {}/{})",
                self.id, delay, attempt, self.config.max_reconnect_attempts
            );
            let _ = self.events.send(StreamEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Reserve the next reconnect attempt, if any remain.
    fn next_attempt(&self) -> Option<u32> {
        if !self.config.auto_reconnect {
            return None;
        }
        let mut shared = self.shared.lock();
        if shared.reconnect_attempts >= self.config.max_reconnect_attempts {
            return None;
        }
        shared.reconnect_attempts += 1;
        Some(shared.reconnect_attempts)
    }

    /// One connection lifetime. Returns once the socket closes or the task is cancelled.
    async fn connect_once(&self) -> Result<(), EdgeError> {
        self.shared.lock().state = StreamState::Connecting;

        let token = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            token = self.tokens.session_token() => token?,
        };
        let url = stream_url(&self.config.url, &token)?;

        let (ws, _) = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            result = connect_async(url.as_str()) => {
                result.map_err(|e| EdgeError::Upstream(e.to_string()))?
            }
        };
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let mut shared = self.shared.lock();
            shared.state = StreamState::Open;
            shared.reconnect_attempts = 0;
            shared.outbound = Some(tx);
        }
        info!("Stream {} connected", self.id);
        let _ = self.events.send(StreamEvent::Opened);

        let mut heartbeat = heartbeat_timer(self.config.heartbeat_interval);

        let clean = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break true;
                }
                _ = tick(&mut heartbeat) => {
                    debug!("Stream {} heartbeat", self.id);
                    let ping = Message::Text(self.config.heartbeat_message.clone().into());
                    if let Err(e) = sink.send(ping).await {
                        let _ = self.events.send(StreamEvent::Error(e.to_string()));
                        break false;
                    }
                }
                Some(message) = rx.recv() => {
                    if let Err(e) = sink.send(message).await {
                        let _ = self.events.send(StreamEvent::Error(e.to_string()));
                        break false;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.events.send(StreamEvent::Message(text.as_str().to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.is_none_or(|f| f.code == CloseCode::Normal);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = self.events.send(StreamEvent::Error(e.to_string()));
                        break false;
                    }
                    None => break false,
                }
            }
        };

        {
            let mut shared = self.shared.lock();
            shared.state = StreamState::Disconnected;
            shared.outbound = None;
        }
        info!("Stream {} closed (clean: {})", self.id, clean);
        let _ = self.events.send(StreamEvent::Closed { clean });
        Ok(())
    }
}

/// Endpoint URL with the session token appended as a query parameter.
pub fn stream_url(base: &str, token: &SecretString) -> Result<Url, EdgeError> {
    let mut url = Url::parse(base).map_err(|e| EdgeError::BadRequest(format!("Invalid stream URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair(QueryParams::TOKEN, token.expose_secret());
    Ok(url)
}

fn heartbeat_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
