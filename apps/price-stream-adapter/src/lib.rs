#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Adapter - Heartbeat-Aware Quote Cache Feeder
//!
//! Maintains a single WebSocket connection to a quote provider, decodes
//! price ticks from a shared multiplexed feed, and keeps a response cache
//! of last-known-good prices. Provider heartbeats extend cache lifetimes
//! so prices survive quiet market hours without ever being rewritten.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `subscription`: Parameter tuples and the append-only registry
//!   - `pricing`: Price ticks, heartbeats, cached response shape
//!   - `fingerprint`: Deterministic cache keys
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Cache, subscription sink, balance source
//!   - `services`: Tick publishing, heartbeat refresh, reads, balances
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Provider WebSocket client, auth, decoder, wire schema
//!   - `cache`: In-memory response cache
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                        +----------------+   Tick      +---------------+
//! Provider WS --frames-->| StreamClient   |------------>| TickPublisher |--set-----+
//!                        |  + Decoder     |             +---------------+          v
//!                        +----------------+  Heartbeat  +-------------------+  +-------+
//!                              ^        +-------------->| LivenessRefresher |->| Cache |
//!                  subscribe   |                        +-------------------+  +-------+
//!                              |                              set_ttl            ^
//!                        +----------------+                                      |
//!      caller ---------->| PriceService   |-----------------get------------------+
//!                        +----------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::fingerprint::{Fingerprint, FingerprintConfig, Fingerprinter};
pub use domain::pricing::{AdapterResponse, HeartbeatEvent, PriceProvenance, PriceTick};
pub use domain::subscription::{ParamsError, SubscriptionParams, SubscriptionRegistry};

// Ports and services
pub use application::ports::{
    BalanceError, BalanceSource, CacheError, ResponseCache, SubscriptionSink,
};
pub use application::services::{
    AdapterError, BalanceOutcome, BalanceRequest, ErrorResponse, FeedProcessor,
    LivenessRefresher, PriceRequest, PriceService, RefreshReport, SupportedAssets, TickPublisher,
    lookup_balances,
};

// Infrastructure config
pub use infrastructure::config::{
    AdapterConfig, CacheSettings, ConfigError, ConnectionSettings, ProviderSettings,
    ServerSettings,
};

// Provider stream
pub use infrastructure::stream::{
    ConnectionHandle, ConnectionState, Credentials, MessageDecoder, StreamClient,
    StreamClientConfig, StreamClientError, StreamEvent, StreamTemplate, WireSchema,
};

// Cache
pub use infrastructure::cache::InMemoryCache;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
