//! Price Stream Adapter Binary
//!
//! Starts the provider stream, the feed processor and the health server.
//! Exits non-zero if the provider stream stops on its own.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-adapter
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `WS_API_ENDPOINT`: Provider WebSocket URL
//! - `API_USERNAME` / `API_PASSWORD`: Provider credentials
//! - `STREAM_NAME`: Stream code to accept from the shared feed
//!
//! ## Optional
//! - `API_MODE`: Auth mode (default: stream)
//! - `ADAPTER_NAME`: Adapter identity in cache keys (default: price-stream-adapter)
//! - `CACHE_MAX_AGE_MS`: Cache TTL (default: 90000)
//! - `SUBSCRIPTIONS`: Seed tuples, `BASE/QUOTE/SOURCE,...`
//! - `WIRE_SCHEMA`: compact | verbose (default: compact)
//! - `STREAM_TEMPLATE`: Subscribe stream id pattern (default: `{base}{quote}.{source}:{stream}`)
//! - `HEALTH_PORT`: Health check HTTP port (default: 8080)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_stream_adapter::infrastructure::stream::{KeepaliveConfig, ReconnectConfig};
use price_stream_adapter::infrastructure::telemetry;
use price_stream_adapter::{
    AdapterConfig, FeedProcessor, FingerprintConfig, Fingerprinter, HealthServer,
    HealthServerState, InMemoryCache, LivenessRefresher, MessageDecoder, StreamClient,
    StreamClientConfig, StreamEvent, SubscriptionRegistry, TickPublisher, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often expired cache entries are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting Price Stream Adapter"
    );

    let _metrics_handle = init_metrics();

    let config = AdapterConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(SubscriptionRegistry::with_params(
        config.subscriptions.iter().cloned(),
    ));
    let cache = Arc::new(InMemoryCache::new());
    let fingerprinter = Fingerprinter::new(
        config.adapter_name.clone(),
        FingerprintConfig {
            stream: config.provider.stream_name.clone(),
            endpoint: config.provider.endpoint.clone(),
        },
    );

    let publisher = TickPublisher::new(cache.clone(), fingerprinter.clone(), config.cache.max_age);
    let refresher = Arc::new(LivenessRefresher::new(
        Arc::clone(&registry),
        cache.clone(),
        fingerprinter,
        config.provider.stream_name.clone(),
        config.cache.max_age,
    ));

    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(1024);

    let mut client_config = StreamClientConfig::new(
        config.provider.endpoint.clone(),
        config.provider.credentials.clone(),
    );
    client_config.template = config.provider.template.clone();
    client_config.reconnect = ReconnectConfig::from_settings(&config.connection);
    client_config.keepalive = KeepaliveConfig::from_settings(&config.connection);

    let client = Arc::new(StreamClient::new(
        client_config,
        MessageDecoder::new(config.schema.clone(), config.provider.stream_name.clone()),
        Arc::clone(&registry),
        event_tx,
        shutdown_token.clone(),
    ));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&client),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn feed processor
    let processor = FeedProcessor::new(publisher, refresher, shutdown_token.clone());
    tokio::spawn(processor.run(event_rx));

    // Spawn provider stream
    let stream_client = Arc::clone(&client);
    let mut stream_task = tokio::spawn(stream_client.run());

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn cache purge
    let purge_cache = Arc::clone(&cache);
    let purge_token = shutdown_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = purge_token.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = purge_cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = purge_cache.len(), "Expired cache entries purged");
                    }
                }
            }
        }
    });

    tracing::info!("Price stream adapter ready");

    tokio::select! {
        () = await_shutdown(shutdown_token.clone()) => {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut stream_task)
                .await
                .is_err()
            {
                tracing::warn!("Provider stream did not close before the shutdown timeout");
            }
            tracing::info!("Price stream adapter stopped");
            Ok(())
        }
        outcome = &mut stream_task => {
            shutdown_token.cancel();
            let reason = match outcome {
                Ok(Ok(())) => anyhow::anyhow!("provider stream stopped unexpectedly"),
                Ok(Err(e)) => anyhow::Error::new(e).context("provider stream failed"),
                Err(e) => anyhow::Error::new(e).context("provider stream task aborted"),
            };
            tracing::error!(error = %reason, "Price stream adapter exiting");
            Err(reason)
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AdapterConfig) {
    tracing::info!(
        adapter = %config.adapter_name,
        stream = %config.provider.stream_name,
        max_age_ms = u64::try_from(config.cache.max_age.as_millis()).unwrap_or(u64::MAX),
        seed_subscriptions = config.subscriptions.len(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        endpoint = %config.provider.endpoint,
        credentials = ?config.provider.credentials,
        "Provider endpoint"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
