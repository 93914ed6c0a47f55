//! Health and Metrics HTTP Surface
//!
//! Probes derived from the provider stream's connection state, plus the
//! Prometheus scrape endpoint.
//!
//! | Route      | Body                         | Non-200 when                 |
//! |------------|------------------------------|------------------------------|
//! | `/health`  | JSON [`StatusReport`]        | stream disconnected/closing  |
//! | `/healthz` | `OK`                         | never                        |
//! | `/readyz`  | `READY` / `NOT READY`        | stream not Ready             |
//! | `/metrics` | Prometheus text exposition   | recorder not installed       |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::stream::{ConnectionState, FeedStatsSnapshot, StreamClient};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Report
// =============================================================================

/// Coarse health derived from the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ready: ticks and heartbeats are flowing.
    Healthy,
    /// A connection instance is being established.
    Degraded,
    /// No connection instance is alive.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Ready => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Authenticating => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::Closing => Self::Unhealthy,
        }
    }
}

impl HealthStatus {
    /// Degraded still answers 200; cached prices keep being served.
    const fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy | Self::Degraded => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Body of `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Coarse status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Seconds since the server state was created.
    pub uptime_secs: u64,
    /// Wall clock at report time.
    pub current_time: DateTime<Utc>,
    /// Provider stream details.
    pub stream: StreamReport,
    /// Registered subscription tuples.
    pub subscriptions: usize,
}

/// Provider stream section of the report.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    /// Stream code accepted from the shared feed.
    pub name: String,
    /// Connection state label.
    pub state: &'static str,
    /// When the current connection reached Ready.
    pub established_at: Option<DateTime<Utc>>,
    /// Frame counters since startup.
    pub stats: FeedStatsSnapshot,
}

/// What the handlers read from.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    client: Arc<StreamClient>,
}

impl HealthServerState {
    /// Wrap the stream client; uptime counts from here.
    #[must_use]
    pub fn new(version: String, client: Arc<StreamClient>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            client,
        }
    }

    fn report(&self) -> StatusReport {
        let client = &self.client;
        let state = client.state();
        StatusReport {
            status: state.into(),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            stream: StreamReport {
                name: client.stream().to_string(),
                state: state.as_str(),
                established_at: client.established_at(),
                stats: client.stats(),
            },
            subscriptions: client.registry().len(),
        }
    }

    fn is_ready(&self) -> bool {
        self.client.state() == ConnectionState::Ready
    }
}

// =============================================================================
// Server
// =============================================================================

/// Probe and scrape server, stopped by the shared cancellation token.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Configure a server on `0.0.0.0:port`.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Routes over the given state.
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(report))
            .route("/healthz", get(|| async { "OK" }))
            .route("/readyz", get(readiness))
            .route("/metrics", get(scrape))
            .with_state(state)
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// `BindFailed` if the port is unavailable, `Serve` if the accept loop fails.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let port = self.port;
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| HealthServerError::BindFailed { port, source })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// `Serve` if the accept loop fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Health server listening");
        }

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

async fn report(State(state): State<Arc<HealthServerState>>) -> Response {
    let body = state.report();
    (body.status.http_status(), Json(body)).into_response()
}

async fn readiness(State(state): State<Arc<HealthServerState>>) -> Response {
    if state.is_ready() {
        "READY".into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response()
    }
}

async fn scrape() -> Response {
    match get_metrics_handle() {
        Some(handle) => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Health server failures.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Port unavailable.
    #[error("cannot bind health port {port}")]
    BindFailed {
        /// Requested port.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },

    /// Accept loop failed.
    #[error("health server failed")]
    Serve(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::subscription::{SubscriptionParams, SubscriptionRegistry};
    use crate::infrastructure::stream::{
        Credentials, MessageDecoder, StreamClientConfig, WireSchema,
    };

    fn idle_state() -> Arc<HealthServerState> {
        let (event_tx, _event_rx) = mpsc::channel(1);
        let registry = Arc::new(SubscriptionRegistry::with_params([
            SubscriptionParams::new("EUR", "USD", "BGNL").unwrap(),
        ]));
        let client = StreamClient::new(
            StreamClientConfig::new(
                "ws://127.0.0.1:9",
                Credentials::new("alice", "pw", "stream").unwrap(),
            ),
            MessageDecoder::new(WireSchema::compact(), "FXSPOT"),
            registry,
            event_tx,
            CancellationToken::new(),
        );
        Arc::new(HealthServerState::new("0.1.0".to_string(), Arc::new(client)))
    }

    /// Issue a bare HTTP/1.1 GET and return the status line.
    async fn status_line(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw.lines().next().unwrap_or_default().to_string()
    }

    #[test]
    fn connection_state_maps_to_status() {
        let cases = [
            (ConnectionState::Ready, HealthStatus::Healthy),
            (ConnectionState::Connecting, HealthStatus::Degraded),
            (ConnectionState::Authenticating, HealthStatus::Degraded),
            (ConnectionState::Disconnected, HealthStatus::Unhealthy),
            (ConnectionState::Closing, HealthStatus::Unhealthy),
        ];
        for (state, expected) in cases {
            assert_eq!(HealthStatus::from(state), expected, "{state:?}");
        }
    }

    #[test]
    fn degraded_still_answers_ok() {
        assert_eq!(HealthStatus::Degraded.http_status(), StatusCode::OK);
        assert_eq!(
            HealthStatus::Unhealthy.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn report_serializes_lowercase_status_and_stream_details() {
        let json = serde_json::to_value(idle_state().report()).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["stream"]["name"], "FXSPOT");
        assert_eq!(json["stream"]["state"], "disconnected");
        assert!(json["stream"]["established_at"].is_null());
        assert_eq!(json["subscriptions"], 1);
    }

    #[tokio::test]
    async fn probes_over_http_before_the_stream_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = HealthServer::new(0, idle_state(), cancel.clone());
        let task = tokio::spawn(server.serve(listener));

        assert!(status_line(addr, "/healthz").await.contains("200"));
        assert!(status_line(addr, "/readyz").await.contains("503"));
        assert!(status_line(addr, "/health").await.contains("503"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
