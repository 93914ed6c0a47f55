//! Prometheus Metrics Module
//!
//! Exposes adapter metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames by classification
//! - **Cache**: ticks published, TTL refresh outcomes, cache failures
//! - **Connection**: state gauge, reconnects, connection errors
//! - **Subscriptions**: registry size
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::RefreshReport;
use crate::infrastructure::stream::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            #[allow(clippy::expect_used)]
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_adapter_frames_total",
        "Inbound provider messages by classification"
    );
    describe_counter!(
        "price_adapter_ignored_total",
        "Inbound messages ignored, by reason"
    );

    describe_counter!(
        "price_adapter_ticks_published_total",
        "Price ticks written to the response cache"
    );
    describe_counter!(
        "price_adapter_ttl_refresh_total",
        "Heartbeat TTL refresh outcomes per fingerprint"
    );
    describe_counter!(
        "price_adapter_cache_failures_total",
        "Cache operations that failed"
    );
    describe_histogram!(
        "price_adapter_refresh_seconds",
        "Duration of one heartbeat refresh pass"
    );

    describe_gauge!(
        "price_adapter_connection_state",
        "Connection state (0=disconnected 1=connecting 2=authenticating 3=ready 4=closing)"
    );
    describe_counter!(
        "price_adapter_reconnects_total",
        "Provider reconnection attempts"
    );
    describe_counter!(
        "price_adapter_connection_errors_total",
        "Connection instances ended by error, by kind"
    );

    describe_gauge!(
        "price_adapter_subscriptions",
        "Registered subscription tuples"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Classification label for inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Price tick.
    Tick,
    /// Provider heartbeat.
    Heartbeat,
    /// Received before the auth ack.
    PreAuth,
    /// Not JSON.
    Malformed,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Heartbeat => "heartbeat",
            Self::PreAuth => "pre_auth",
            Self::Malformed => "malformed",
        }
    }
}

/// Cache operation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    /// Value write.
    Set,
    /// TTL extension.
    SetTtl,
}

impl CacheOperation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::SetTtl => "set_ttl",
        }
    }
}

/// Record an inbound message.
pub fn record_frame(kind: FrameKind) {
    counter!("price_adapter_frames_total", "kind" => kind.as_str()).increment(1);
}

/// Record an ignored message.
pub fn record_ignored(reason: &'static str) {
    counter!("price_adapter_frames_total", "kind" => "ignored").increment(1);
    counter!("price_adapter_ignored_total", "reason" => reason).increment(1);
}

/// Record a successful tick write.
pub fn record_tick_published() {
    counter!("price_adapter_ticks_published_total").increment(1);
}

/// Record a failed cache operation.
pub fn record_cache_failure(operation: CacheOperation) {
    counter!(
        "price_adapter_cache_failures_total",
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Record the outcome of one heartbeat refresh pass.
pub fn record_refresh(report: &RefreshReport, duration: Duration) {
    counter!("price_adapter_ttl_refresh_total", "outcome" => "extended")
        .increment(u64::try_from(report.extended).unwrap_or(u64::MAX));
    counter!("price_adapter_ttl_refresh_total", "outcome" => "missing")
        .increment(u64::try_from(report.missing).unwrap_or(u64::MAX));
    histogram!("price_adapter_refresh_seconds").record(duration.as_secs_f64());
}

/// Publish the current connection state.
pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Authenticating => 2.0,
        ConnectionState::Ready => 3.0,
        ConnectionState::Closing => 4.0,
    };
    gauge!("price_adapter_connection_state").set(value);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("price_adapter_reconnects_total").increment(1);
}

/// Record a connection instance ending with an error.
pub fn record_connection_error(kind: &'static str) {
    counter!("price_adapter_connection_errors_total", "kind" => kind).increment(1);
}

/// Update the registry size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("price_adapter_subscriptions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
