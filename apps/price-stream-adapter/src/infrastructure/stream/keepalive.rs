//! Transport Keepalive
//!
//! WebSocket ping/pong monitoring for one connection instance. A pong
//! timeout ends the connection and triggers a reconnect.
//!
//! This is independent of the provider heartbeat records, which arrive as
//! ordinary data frames and only drive cache TTL refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::ConnectionSettings;

/// Ping cadence and pong deadline.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Time without any inbound traffic before the connection is dead.
    pub pong_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl KeepaliveConfig {
    /// Build from connection settings.
    #[must_use]
    pub const fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            pong_timeout: settings.ping_timeout,
        }
    }
}

/// Signals from the monitor to the connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveSignal {
    /// Send a ping now.
    SendPing,
    /// No traffic within the deadline.
    Timeout,
}

/// Liveness bookkeeping shared with the read loop.
#[derive(Debug)]
pub struct KeepaliveState {
    last_seen: RwLock<Instant>,
    awaiting_pong: AtomicBool,
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: RwLock::new(Instant::now()),
            awaiting_pong: AtomicBool::new(false),
        }
    }

    /// Record inbound traffic (pong or any data frame).
    pub fn record_activity(&self) {
        *self.last_seen.write() = Instant::now();
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    /// Record that a ping went out.
    pub fn mark_ping_sent(&self) {
        self.awaiting_pong.store(true, Ordering::SeqCst);
    }

    /// Check whether a ping is outstanding.
    #[must_use]
    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong.load(Ordering::SeqCst)
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_seen.read().elapsed()
    }
}

/// Periodic ping/timeout monitor.
pub struct KeepaliveMonitor {
    config: KeepaliveConfig,
    state: Arc<KeepaliveState>,
    signal_tx: mpsc::Sender<KeepaliveSignal>,
    cancel: CancellationToken,
}

impl KeepaliveMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(
        config: KeepaliveConfig,
        state: Arc<KeepaliveState>,
        signal_tx: mpsc::Sender<KeepaliveSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            signal_tx,
            cancel,
        }
    }

    /// Run until cancelled, the signal channel closes, or a timeout fires.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check_and_ping().await {
                        break;
                    }
                }
            }
        }
    }

    async fn check_and_ping(&self) -> bool {
        if self.state.is_awaiting_pong() {
            let idle = self.state.idle_for();
            if idle > self.config.pong_timeout {
                tracing::warn!(
                    idle_secs = idle.as_secs(),
                    timeout_secs = self.config.pong_timeout.as_secs(),
                    "Keepalive timeout detected"
                );
                let _ = self.signal_tx.send(KeepaliveSignal::Timeout).await;
                return false;
            }
        }

        if self.signal_tx.send(KeepaliveSignal::SendPing).await.is_err() {
            tracing::debug!("Keepalive channel closed");
            return false;
        }
        true
    }
}
