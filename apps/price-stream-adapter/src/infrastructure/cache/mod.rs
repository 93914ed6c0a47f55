//! In-Memory Response Cache
//!
//! Deadline-per-entry implementation of the response cache port. Expired
//! entries read as absent and are dropped lazily or by
//! [`InMemoryCache::purge_expired`].
//!
//! Deadlines use `tokio::time::Instant`, so tests can drive expiry with a
//! paused clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::application::ports::{CacheError, ResponseCache};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::pricing::AdapterResponse;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AdapterResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local response cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry.
    #[must_use]
    pub fn remaining_ttl(&self, key: &Fingerprint) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &Fingerprint) -> Result<Option<AdapterResponse>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &Fingerprint,
        value: AdapterResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::WriteRejected {
                key: key.to_string(),
                message: "ttl must be positive".to_string(),
            });
        }

        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .insert(key.clone(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn set_ttl(&self, key: &Fingerprint, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<Fingerprint>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::fingerprint::{FingerprintConfig, Fingerprinter};
    use crate::domain::pricing::{PriceProvenance, PriceTick};
    use crate::domain::subscription::SubscriptionParams;

    fn key(base: &str) -> Fingerprint {
        Fingerprinter::new(
            "test-adapter",
            FingerprintConfig {
                stream: "FXSPOT".to_string(),
                endpoint: "wss://example.test".to_string(),
            },
        )
        .fingerprint(&SubscriptionParams::new(base, "USD", "BGNL").unwrap())
    }

    fn response(result: &str) -> AdapterResponse {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        PriceTick {
            params: SubscriptionParams::new("EUR", "USD", "BGNL").unwrap(),
            result: Decimal::from_str(result).unwrap(),
            provenance: PriceProvenance::Midpoint,
            stream_established_at: at,
            received_at: at,
            provider_time: None,
        }
        .to_response()
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set(&key("EUR"), response("1.1"), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get(&key("EUR")).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key("EUR")).await.unwrap().is_none());
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_ttl_extends_without_changing_value() {
        let cache = InMemoryCache::new();
        cache
            .set(&key("EUR"), response("1.1001"), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.set_ttl(&key("EUR"), Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        let value = cache.get(&key("EUR")).await.unwrap().unwrap();
        assert_eq!(value, response("1.1001"));
        assert_eq!(
            cache.remaining_ttl(&key("EUR")),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn set_ttl_never_materializes_entries() {
        let cache = InMemoryCache::new();
        assert!(!cache.set_ttl(&key("EUR"), Duration::from_secs(10)).await.unwrap());
        assert!(cache.is_empty());
        assert!(cache.get(&key("EUR")).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn set_ttl_does_not_revive_expired_entries() {
        let cache = InMemoryCache::new();
        cache
            .set(&key("EUR"), response("1.1"), Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!cache.set_ttl(&key("EUR"), Duration::from_secs(10)).await.unwrap());
        assert!(cache.get(&key("EUR")).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = InMemoryCache::new();
        cache
            .set(&key("EUR"), response("1.1"), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set(&key("GBP"), response("1.2"), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys().await.unwrap(), vec![key("GBP")]);
    }

    #[tokio::test]
    async fn zero_ttl_write_rejected() {
        let cache = InMemoryCache::new();
        let err = cache
            .set(&key("EUR"), response("1.1"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::WriteRejected { .. }));
    }
}
