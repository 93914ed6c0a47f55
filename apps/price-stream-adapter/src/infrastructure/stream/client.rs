//! Streaming Connection Manager
//!
//! Owns the single provider connection: connect, authenticate, subscribe,
//! decode, reconnect. Decoded ticks and heartbeats leave through an `mpsc`
//! channel to the feed processor; the connection state is published on a
//! `watch` channel so callers can await Ready.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected → Connecting → Authenticating ──ack──▶ Ready
//!       ▲                                              │
//!       └──────── drop / close / keepalive timeout ◀───┘
//! ```
//!
//! Every Ready transition records a fresh "stream established" timestamp,
//! resets backoff and re-issues subscribe directives for the full registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::auth::{AuthError, AuthHandler, AuthProgress, Credentials};
use super::decoder::{DecodeContext, DecodedMessage, MessageDecoder};
use super::directives::StreamTemplate;
use super::keepalive::{KeepaliveConfig, KeepaliveMonitor, KeepaliveSignal, KeepaliveState};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::application::ports::SubscriptionSink;
use crate::domain::pricing::{HeartbeatEvent, PriceTick};
use crate::domain::subscription::{SubscriptionParams, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, FrameKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a connection instance or the client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication rejected.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Directive serialization failed.
    #[error("failed to encode directive: {0}")]
    Encode(#[from] serde_json::Error),

    /// Sending a frame failed.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// No traffic within the keepalive deadline.
    #[error("keepalive timeout")]
    KeepaliveTimeout,

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Backoff exhausted.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),

    /// The connection task panicked or was aborted.
    #[error("connection task failed: {0}")]
    TaskFailed(String),
}

// =============================================================================
// State and Events
// =============================================================================

/// Connection state, owned by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// TCP/TLS/WebSocket handshake in progress.
    Connecting,
    /// Auth directive sent, awaiting ack.
    Authenticating,
    /// Authenticated; directives and data flow.
    Ready,
    /// Shutting down.
    Closing,
}

impl ConnectionState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}

/// Events emitted to the feed processor.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Authenticated; subscribe directives are going out.
    Connected {
        /// Connection instance id.
        connection_id: Uuid,
        /// Stream established timestamp for this instance.
        established_at: DateTime<Utc>,
    },
    /// Connection instance ended.
    Disconnected,
    /// Waiting to reconnect.
    Reconnecting {
        /// Attempt number since the last Ready.
        attempt: u32,
    },
    /// Decoded price tick.
    Tick(PriceTick),
    /// Provider heartbeat for the configured stream.
    Heartbeat(HeartbeatEvent),
    /// A connection instance failed; the client will back off and retry.
    Error(String),
}

/// Frame counters exposed on the health endpoint.
#[derive(Debug, Default)]
pub struct FeedStats {
    frames_received: AtomicU64,
    ticks: AtomicU64,
    heartbeats: AtomicU64,
    ignored: AtomicU64,
    reconnect_attempts: AtomicU32,
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FeedStatsSnapshot {
    /// Text frames received.
    pub frames_received: u64,
    /// Ticks decoded.
    pub ticks: u64,
    /// Heartbeats decoded.
    pub heartbeats: u64,
    /// Messages ignored.
    pub ignored: u64,
    /// Reconnect attempts since the last Ready.
    pub reconnect_attempts: u32,
}

impl FeedStats {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
enum Command {
    Subscribe(SubscriptionParams),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Provider credentials.
    pub credentials: Credentials,
    /// Subscribe stream-id template.
    pub template: StreamTemplate,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Transport keepalive configuration.
    pub keepalive: KeepaliveConfig,
}

impl StreamClientConfig {
    /// Create a configuration with default backoff and keepalive.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            template: StreamTemplate::default(),
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Persistent provider connection.
pub struct StreamClient {
    config: StreamClientConfig,
    decoder: MessageDecoder,
    registry: Arc<SubscriptionRegistry>,
    event_tx: mpsc::Sender<StreamEvent>,
    state_tx: watch::Sender<ConnectionState>,
    established_at: RwLock<Option<DateTime<Utc>>>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<mpsc::UnboundedReceiver<Command>>,
    stats: FeedStats,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create a client. Nothing connects until [`StreamClient::open`] or
    /// [`StreamClient::run`].
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        decoder: MessageDecoder,
        registry: Arc<SubscriptionRegistry>,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            decoder,
            registry,
            event_tx,
            state_tx,
            established_at: RwLock::new(None),
            command_tx,
            command_rx: Mutex::new(command_rx),
            stats: FeedStats::default(),
            cancel,
        }
    }

    /// Spawn the connection loop and return a handle whose
    /// [`ConnectionHandle::ready`] resolves once the provider acknowledges
    /// authentication.
    #[must_use]
    pub fn open(self: &Arc<Self>) -> ConnectionHandle {
        let state_rx = self.state_tx.subscribe();
        let task = tokio::spawn(Arc::clone(self).run());
        ConnectionHandle {
            client: Arc::clone(self),
            state_rx,
            task: Some(task),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Established timestamp of the current connection instance.
    #[must_use]
    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        *self.established_at.read()
    }

    /// Shared subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Configured stream name.
    #[must_use]
    pub fn stream(&self) -> &str {
        self.decoder.stream()
    }

    /// Frame counters.
    #[must_use]
    pub fn stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    /// Register a tuple. A new tuple on a Ready connection gets its
    /// directive immediately; otherwise it goes out on the next Ready.
    ///
    /// Returns `true` if the tuple was new.
    pub fn subscribe(&self, params: SubscriptionParams) -> bool {
        let added = self.registry.register(params.clone());
        if added {
            metrics::set_subscriptions(self.registry.len());
            tracing::info!(params = %params, "Subscription registered");
            if self.state() == ConnectionState::Ready {
                let _ = self.command_tx.send(Command::Subscribe(params));
            }
        }
        added
    }

    /// Run the connection loop until cancelled or backoff is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `StreamClientError::Reconnect` when the attempt cap is hit.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamClientError> {
        let _exit = ExitGuard(&self);
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        metrics::set_subscriptions(self.registry.len());

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                tracing::info!("Stream client cancelled");
                return Ok(());
            }

            let connection_id = Uuid::new_v4();
            match self.connect_and_run(connection_id, &mut policy).await {
                Ok(()) => {
                    self.end_connection();
                    tracing::info!(%connection_id, "Stream connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    self.end_connection();
                    tracing::warn!(%connection_id, error = %e, "Stream connection error");
                    metrics::record_connection_error(error_kind(&e));
                    let _ = self.event_tx.send(StreamEvent::Error(e.to_string())).await;
                    let _ = self.event_tx.send(StreamEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        let attempts = policy.attempt_count();
                        tracing::error!(attempts, "Giving up on stream connection");
                        return Err(ReconnectError::MaxAttemptsExceeded(attempts).into());
                    };

                    let attempt = policy.attempt_count();
                    self.stats
                        .reconnect_attempts
                        .store(attempt, Ordering::Relaxed);
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to provider stream"
                    );
                    let _ = self
                        .event_tx
                        .send(StreamEvent::Reconnecting { attempt })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.set_state(ConnectionState::Disconnected);
                            tracing::info!("Stream client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_and_run(
        &self,
        connection_id: Uuid,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamClientError> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(%connection_id, url = %self.config.url, "Connecting to provider stream");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut auth = AuthHandler::new(self.config.credentials.clone());
        let directive = serde_json::to_string(&auth.create_auth_request())?;
        self.set_state(ConnectionState::Authenticating);
        send_text(&mut write, directive).await?;
        tracing::debug!(
            %connection_id,
            user = %self.config.credentials.user(),
            "Auth directive sent"
        );

        let keepalive_state = Arc::new(KeepaliveState::new());
        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<KeepaliveSignal>(8);
        let keepalive_cancel = self.cancel.child_token();
        tokio::spawn(
            KeepaliveMonitor::new(
                self.config.keepalive.clone(),
                Arc::clone(&keepalive_state),
                keepalive_tx,
                keepalive_cancel.clone(),
            )
            .run(),
        );
        let _keepalive_guard = keepalive_cancel.drop_guard();

        let mut commands = self.command_rx.lock().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                signal = keepalive_rx.recv() => {
                    match signal {
                        Some(KeepaliveSignal::SendPing) => {
                            keepalive_state.mark_ping_sent();
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        Some(KeepaliveSignal::Timeout) => {
                            return Err(StreamClientError::KeepaliveTimeout);
                        }
                        None => tracing::debug!("Keepalive channel closed"),
                    }
                }
                Some(command) = commands.recv(), if auth.is_authenticated() => {
                    let Command::Subscribe(params) = command;
                    self.send_subscribe(&mut write, &params).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            keepalive_state.record_activity();
                            if auth.is_authenticated() {
                                self.handle_data_frame(&text).await;
                            } else if auth.on_frame(&text)? == AuthProgress::Authenticated {
                                while commands.try_recv().is_ok() {}
                                self.on_ready(connection_id, policy, &mut write).await?;
                            } else {
                                metrics::record_frame(FrameKind::PreAuth);
                                tracing::trace!(%connection_id, "Frame before auth ack dropped");
                            }
                        }
                        Some(Ok(Message::Pong(_))) => keepalive_state.record_activity(),
                        Some(Ok(Message::Ping(data))) => {
                            keepalive_state.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(%connection_id, ?frame, "Server sent close frame");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!(%connection_id, "WebSocket stream ended");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    async fn on_ready<W>(
        &self,
        connection_id: Uuid,
        policy: &mut ReconnectPolicy,
        write: &mut W,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let established_at = Utc::now();
        *self.established_at.write() = Some(established_at);
        policy.reset();
        self.stats.reconnect_attempts.store(0, Ordering::Relaxed);
        self.set_state(ConnectionState::Ready);

        tracing::info!(
            %connection_id,
            stream = %self.stream(),
            %established_at,
            "Provider stream authenticated"
        );
        let _ = self
            .event_tx
            .send(StreamEvent::Connected {
                connection_id,
                established_at,
            })
            .await;

        let subscriptions = self.registry.all();
        for params in &subscriptions {
            self.send_subscribe(write, params).await?;
        }
        tracing::info!(
            %connection_id,
            count = subscriptions.len(),
            "Subscriptions issued"
        );
        Ok(())
    }

    async fn handle_data_frame(&self, text: &str) {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let received_at = Utc::now();
        let ctx = DecodeContext {
            received_at,
            established_at: self.established_at().unwrap_or(received_at),
        };

        let messages = match self.decoder.decode(text, &ctx) {
            Ok(messages) => messages,
            Err(e) => {
                metrics::record_frame(FrameKind::Malformed);
                tracing::debug!(error = %e, "Undecodable frame dropped");
                return;
            }
        };

        for message in messages {
            match message {
                DecodedMessage::Tick(tick) => {
                    self.stats.ticks.fetch_add(1, Ordering::Relaxed);
                    metrics::record_frame(FrameKind::Tick);
                    let _ = self.event_tx.send(StreamEvent::Tick(tick)).await;
                }
                DecodedMessage::Heartbeat(heartbeat) => {
                    self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
                    metrics::record_frame(FrameKind::Heartbeat);
                    let _ = self.event_tx.send(StreamEvent::Heartbeat(heartbeat)).await;
                }
                DecodedMessage::Ignored(reason) => {
                    self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                    metrics::record_ignored(reason.as_str());
                    tracing::trace!(reason = reason.as_str(), "Message ignored");
                }
            }
        }
    }

    async fn send_subscribe<W>(
        &self,
        write: &mut W,
        params: &SubscriptionParams,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let directive = self.config.template.directive(params, self.stream());
        tracing::debug!(stream_id = %directive.stream_id, "Sending subscribe directive");
        send_text(write, serde_json::to_string(&directive)?).await
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        metrics::set_connection_state(state);
    }

    fn end_connection(&self) {
        *self.established_at.write() = None;
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Leaves the client Disconnected however the connection loop exits,
/// unwinding included.
struct ExitGuard<'a>(&'a StreamClient);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.end_connection();
    }
}

impl SubscriptionSink for StreamClient {
    fn subscribe(&self, params: SubscriptionParams) -> bool {
        Self::subscribe(self, params)
    }
}

async fn send_text<W>(write: &mut W, text: String) -> Result<(), StreamClientError>
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| StreamClientError::Send(e.to_string()))
}

const fn error_kind(error: &StreamClientError) -> &'static str {
    match error {
        StreamClientError::WebSocket(_) => "websocket",
        StreamClientError::Auth(_) => "auth",
        StreamClientError::Encode(_) => "encode",
        StreamClientError::Send(_) => "send",
        StreamClientError::KeepaliveTimeout => "keepalive_timeout",
        StreamClientError::ConnectionClosed => "closed",
        StreamClientError::Reconnect(_) => "reconnect",
        StreamClientError::TaskFailed(_) => "task",
    }
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Handle returned by [`StreamClient::open`].
pub struct ConnectionHandle {
    client: Arc<StreamClient>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<Result<(), StreamClientError>>>,
}

impl ConnectionHandle {
    /// Wait until the provider acknowledges authentication.
    ///
    /// Stays pending for as long as no ack arrives; bound it with
    /// `tokio::time::timeout` or cancel the client to give up.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection loop ends before Ready.
    pub async fn ready(&mut self) -> Result<DateTime<Utc>, StreamClientError> {
        let Some(task) = self.task.as_mut() else {
            return Err(StreamClientError::ConnectionClosed);
        };

        let joined = tokio::select! {
            ready = wait_until_ready(&mut self.state_rx) => {
                ready?;
                None
            }
            joined = task => Some(joined),
        };

        match joined {
            None => self
                .client
                .established_at()
                .ok_or(StreamClientError::ConnectionClosed),
            Some(joined) => {
                self.task = None;
                match joined {
                    Ok(Ok(())) => Err(StreamClientError::ConnectionClosed),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(StreamClientError::TaskFailed(e.to_string())),
                }
            }
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// The client behind this handle.
    #[must_use]
    pub const fn client(&self) -> &Arc<StreamClient> {
        &self.client
    }

    /// Cancel the connection loop and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, if it failed.
    pub async fn shutdown(mut self) -> Result<(), StreamClientError> {
        self.client.cancel.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| StreamClientError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        }
    }
}

/// Resolve once the watched state is Ready.
///
/// # Errors
///
/// Returns `ConnectionClosed` if the sender is dropped first.
pub async fn wait_until_ready(
    state_rx: &mut watch::Receiver<ConnectionState>,
) -> Result<(), StreamClientError> {
    state_rx
        .wait_for(|state| *state == ConnectionState::Ready)
        .await
        .map(|_| ())
        .map_err(|_| StreamClientError::ConnectionClosed)
}
