//! Liveness Refresher
//!
//! On a provider heartbeat, extends the TTL of every cache entry derived
//! from the subscription registry without changing stored values. Outside
//! trading hours this is what keeps "last known good" prices alive.
//!
//! Cost is O(registry size) per heartbeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::ports::ResponseCache;
use crate::domain::fingerprint::Fingerprinter;
use crate::domain::pricing::HeartbeatEvent;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics;

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries whose TTL was extended.
    pub extended: usize,
    /// Fingerprints with no live entry (left absent).
    pub missing: usize,
    /// TTL updates the cache rejected.
    pub failed: usize,
}

impl RefreshReport {
    /// Number of fingerprints visited.
    #[must_use]
    pub const fn visited(&self) -> usize {
        self.extended + self.missing + self.failed
    }
}

/// Extends cache TTLs for all registered subscriptions on heartbeat.
pub struct LivenessRefresher {
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<dyn ResponseCache>,
    fingerprinter: Fingerprinter,
    stream: String,
    max_age: Duration,
}

impl LivenessRefresher {
    /// Create a refresher for the configured stream.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        cache: Arc<dyn ResponseCache>,
        fingerprinter: Fingerprinter,
        stream: impl Into<String>,
        max_age: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            fingerprinter,
            stream: stream.into(),
            max_age,
        }
    }

    /// Run one refresh pass for a heartbeat.
    ///
    /// Heartbeats for a different stream are ignored. Individual cache
    /// failures are logged and counted; the pass always visits every
    /// registered tuple.
    pub async fn refresh(&self, heartbeat: &HeartbeatEvent) -> RefreshReport {
        let mut report = RefreshReport::default();

        if heartbeat.stream != self.stream {
            tracing::debug!(
                heartbeat_stream = %heartbeat.stream,
                stream = %self.stream,
                "Heartbeat for foreign stream ignored"
            );
            return report;
        }

        let started = Instant::now();

        for params in self.registry.all() {
            let fingerprint = self.fingerprinter.fingerprint(&params);
            match self.cache.set_ttl(&fingerprint, self.max_age).await {
                Ok(true) => report.extended += 1,
                Ok(false) => report.missing += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::record_cache_failure(metrics::CacheOperation::SetTtl);
                    tracing::warn!(
                        params = %params,
                        fingerprint = %fingerprint,
                        error = %e,
                        "TTL refresh failed"
                    );
                }
            }
        }

        metrics::record_refresh(&report, started.elapsed());
        tracing::debug!(
            extended = report.extended,
            missing = report.missing,
            failed = report.failed,
            "Heartbeat refresh complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::application::ports::{CacheError, MockResponseCache};
    use crate::domain::fingerprint::FingerprintConfig;
    use crate::domain::subscription::SubscriptionParams;

    fn fingerprinter() -> Fingerprinter {
        Fingerprinter::new(
            "test-adapter",
            FingerprintConfig {
                stream: "FXSPOT".to_string(),
                endpoint: "wss://example.test".to_string(),
            },
        )
    }

    fn heartbeat(stream: &str) -> HeartbeatEvent {
        HeartbeatEvent {
            stream: stream.to_string(),
            received_at: Utc::now(),
        }
    }

    fn registry() -> Arc<SubscriptionRegistry> {
        Arc::new(SubscriptionRegistry::with_params([
            SubscriptionParams::new("EUR", "USD", "BGNL").unwrap(),
            SubscriptionParams::new("GBP", "USD", "BGNL").unwrap(),
            SubscriptionParams::new("USD", "JPY", "BGNL").unwrap(),
        ]))
    }

    #[tokio::test]
    async fn refresh_extends_every_registered_fingerprint() {
        let registry = registry();
        let expected: Vec<_> = registry
            .all()
            .iter()
            .map(|p| fingerprinter().fingerprint(p))
            .collect();

        let mut cache = MockResponseCache::new();
        cache
            .expect_set_ttl()
            .withf(move |key, ttl| expected.contains(key) && *ttl == Duration::from_secs(90))
            .times(3)
            .returning(|_, _| Ok(true));
        cache.expect_set().never();

        let refresher = LivenessRefresher::new(
            registry,
            Arc::new(cache),
            fingerprinter(),
            "FXSPOT",
            Duration::from_secs(90),
        );
        let report = refresher.refresh(&heartbeat("FXSPOT")).await;
        assert_eq!(report.extended, 3);
        assert_eq!(report.visited(), 3);
    }

    #[tokio::test]
    async fn refresh_counts_missing_entries_without_writing() {
        let mut cache = MockResponseCache::new();
        cache.expect_set_ttl().times(3).returning(|_, _| Ok(false));
        cache.expect_set().never();

        let refresher = LivenessRefresher::new(
            registry(),
            Arc::new(cache),
            fingerprinter(),
            "FXSPOT",
            Duration::from_secs(90),
        );
        let report = refresher.refresh(&heartbeat("FXSPOT")).await;
        assert_eq!(report.missing, 3);
        assert_eq!(report.extended, 0);
    }

    #[tokio::test]
    async fn refresh_continues_past_cache_failures() {
        let mut cache = MockResponseCache::new();
        let mut calls = 0;
        cache.expect_set_ttl().times(3).returning(move |_, _| {
            calls += 1;
            if calls == 2 {
                Err(CacheError::Unavailable("blip".to_string()))
            } else {
                Ok(true)
            }
        });

        let refresher = LivenessRefresher::new(
            registry(),
            Arc::new(cache),
            fingerprinter(),
            "FXSPOT",
            Duration::from_secs(90),
        );
        let report = refresher.refresh(&heartbeat("FXSPOT")).await;
        assert_eq!(
            report,
            RefreshReport {
                extended: 2,
                missing: 0,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn refresh_ignores_foreign_stream() {
        let mut cache = MockResponseCache::new();
        cache.expect_set_ttl().never();

        let refresher = LivenessRefresher::new(
            registry(),
            Arc::new(cache),
            fingerprinter(),
            "FXSPOT",
            Duration::from_secs(90),
        );
        let report = refresher.refresh(&heartbeat("OTHER1")).await;
        assert_eq!(report.visited(), 0);
    }
}
