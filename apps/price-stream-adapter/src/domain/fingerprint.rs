//! Cache Fingerprints
//!
//! Deterministic cache keys derived from {adapter identity, subscription
//! parameters, adapter configuration}. The tick publisher and the liveness
//! refresher must land on the same key for the same tuple, so the preimage
//! is a canonical JSON document with a fixed field order, hashed with
//! SHA-256 and hex-encoded.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::subscription::SubscriptionParams;

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Adapter configuration that participates in the fingerprint.
///
/// Credentials are not part of the preimage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintConfig {
    /// Configured stream name.
    pub stream: String,
    /// Provider endpoint.
    pub endpoint: String,
}

#[derive(Serialize)]
struct Preimage<'a> {
    adapter: &'a str,
    params: &'a SubscriptionParams,
    config: &'a FingerprintConfig,
}

/// Computes fingerprints for one adapter instance.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    adapter: String,
    config: FingerprintConfig,
}

impl Fingerprinter {
    /// Create a fingerprinter for an adapter identity and configuration.
    #[must_use]
    pub fn new(adapter: impl Into<String>, config: FingerprintConfig) -> Self {
        Self {
            adapter: adapter.into(),
            config,
        }
    }

    /// Adapter identity.
    #[must_use]
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Fingerprint a subscription tuple.
    #[must_use]
    pub fn fingerprint(&self, params: &SubscriptionParams) -> Fingerprint {
        let preimage = Preimage {
            adapter: &self.adapter,
            params,
            config: &self.config,
        };

        // Serializing plain strings into a Vec cannot fail.
        let bytes = serde_json::to_vec(&preimage).unwrap_or_default();
        Fingerprint(hex::encode(Sha256::digest(&bytes)))
    }
}
