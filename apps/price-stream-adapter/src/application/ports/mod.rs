//! Port Interfaces
//!
//! Contracts for the external collaborators the core consumes, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driving Ports (Inbound)
//!
//! - `SubscriptionSink`: registers a tuple with the connection manager
//!
//! ## Driven Ports (Outbound)
//!
//! - `ResponseCache`: the response-cache storage engine (get / set /
//!   set-TTL / list keys)
//! - `BalanceSource`: per-address balance lookups used by the batch
//!   balance collaborator

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::fingerprint::Fingerprint;
use crate::domain::pricing::AdapterResponse;
use crate::domain::subscription::SubscriptionParams;

// =============================================================================
// Subscription Sink
// =============================================================================

/// Accepts new subscription tuples.
#[cfg_attr(test, mockall::automock)]
pub trait SubscriptionSink: Send + Sync {
    /// Register a tuple. Returns `true` if it was not already registered.
    fn subscribe(&self, params: SubscriptionParams) -> bool;
}

// =============================================================================
// Response Cache
// =============================================================================

/// Cache port errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Backend unavailable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// Write rejected.
    #[error("cache write rejected for {key}: {message}")]
    WriteRejected {
        /// Affected key.
        key: String,
        /// Error details.
        message: String,
    },
}

/// Port to the response cache.
///
/// The core owns no storage; it only writes fresh values and extends
/// expirations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &Fingerprint) -> Result<Option<AdapterResponse>, CacheError>;

    /// Write an entry, replacing any previous value, expiring after `ttl`.
    async fn set(
        &self,
        key: &Fingerprint,
        value: AdapterResponse,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Extend a live entry's expiration to `ttl` from now without touching
    /// its value.
    ///
    /// Returns `Ok(false)` when no live entry exists; nothing is created.
    async fn set_ttl(&self, key: &Fingerprint, ttl: Duration) -> Result<bool, CacheError>;

    /// Keys of all live entries.
    async fn keys(&self) -> Result<Vec<Fingerprint>, CacheError>;
}

// =============================================================================
// Balance Source
// =============================================================================

/// Balance lookup errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BalanceError {
    /// The upstream provider failed for this item.
    #[error("balance provider error: {0}")]
    Provider(String),

    /// The address is malformed for its chain.
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
}

/// Port to a provider that reports on-chain balances.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch the balance of `coin` held by `address` on `chain`.
    async fn fetch_balance(
        &self,
        chain: &str,
        address: &str,
        coin: &str,
    ) -> Result<Decimal, BalanceError>;
}
