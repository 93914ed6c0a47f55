//! Feed Processor
//!
//! Single consumer of the connection manager's event channel. Ticks are
//! published inline, one at a time, so no two ticks race to write the same
//! fingerprint. Heartbeats kick off a refresh pass on a separate task so
//! decoding never waits on it; at most one pass runs at a time and a
//! heartbeat arriving mid-pass is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::publisher::TickPublisher;
use super::refresher::{LivenessRefresher, RefreshReport};
use crate::domain::pricing::HeartbeatEvent;
use crate::infrastructure::stream::StreamEvent;

/// Routes stream events to the publisher and the refresher.
pub struct FeedProcessor {
    publisher: TickPublisher,
    refresher: Arc<LivenessRefresher>,
    refresh_in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl FeedProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(
        publisher: TickPublisher,
        refresher: Arc<LivenessRefresher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            publisher,
            refresher,
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Consume events until the channel closes or the token is cancelled.
    pub async fn run(self, mut rx: mpsc::Receiver<StreamEvent>) {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::info!("Feed processor shutting down");
                    break;
                }

                event = rx.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Event channel closed");
                        break;
                    };
                    self.handle(event).await;
                }
            }
        }
    }

    /// Handle one event.
    pub async fn handle(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected {
                connection_id,
                established_at,
            } => {
                tracing::info!(
                    connection_id = %connection_id,
                    established_at = %established_at,
                    "Provider stream established"
                );
            }
            StreamEvent::Disconnected => {
                tracing::warn!("Provider stream disconnected");
            }
            StreamEvent::Reconnecting { attempt } => {
                tracing::info!(attempt, "Provider stream reconnecting");
            }
            StreamEvent::Tick(tick) => {
                if let Err(e) = self.publisher.publish(&tick).await {
                    tracing::warn!(
                        params = %tick.params,
                        fingerprint = %e.fingerprint,
                        error = %e.source,
                        "Tick publish failed"
                    );
                }
            }
            StreamEvent::Heartbeat(heartbeat) => {
                let _ = self.spawn_refresh(heartbeat);
            }
            StreamEvent::Error(message) => {
                tracing::warn!(error = %message, "Provider connection instance failed");
            }
        }
    }

    /// Start a refresh pass unless one is already running.
    ///
    /// Returns `None` when the heartbeat was skipped.
    pub fn spawn_refresh(&self, heartbeat: HeartbeatEvent) -> Option<JoinHandle<RefreshReport>> {
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(stream = %heartbeat.stream, "Refresh in flight, heartbeat skipped");
            return None;
        }

        let refresher = Arc::clone(&self.refresher);
        let in_flight = InFlight(Arc::clone(&self.refresh_in_flight));
        Some(tokio::spawn(async move {
            let _in_flight = in_flight;
            refresher.refresh(&heartbeat).await
        }))
    }
}

/// Clears the in-flight flag when a refresh task ends, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
