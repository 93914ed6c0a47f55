//! Tick Publisher
//!
//! Turns decoded price ticks into cache writes under the subscription's
//! fingerprint. Failures are reported to the caller, never retried here.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{CacheError, ResponseCache};
use crate::domain::fingerprint::{Fingerprint, Fingerprinter};
use crate::domain::pricing::PriceTick;
use crate::infrastructure::metrics;

/// A cache write for a tick failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to publish tick for {fingerprint}: {source}")]
pub struct PublishError {
    /// Key the write was aimed at.
    pub fingerprint: Fingerprint,
    /// Underlying cache error.
    #[source]
    pub source: CacheError,
}

/// Writes fresh tick values into the response cache.
pub struct TickPublisher {
    cache: Arc<dyn ResponseCache>,
    fingerprinter: Fingerprinter,
    max_age: Duration,
}

impl TickPublisher {
    /// Create a publisher writing with the configured max-age TTL.
    #[must_use]
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        fingerprinter: Fingerprinter,
        max_age: Duration,
    ) -> Self {
        Self {
            cache,
            fingerprinter,
            max_age,
        }
    }

    /// Write the tick's response under its fingerprint with a fresh TTL.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if the cache rejects the write.
    pub async fn publish(&self, tick: &PriceTick) -> Result<Fingerprint, PublishError> {
        let fingerprint = self.fingerprinter.fingerprint(&tick.params);

        match self
            .cache
            .set(&fingerprint, tick.to_response(), self.max_age)
            .await
        {
            Ok(()) => {
                metrics::record_tick_published();
                tracing::trace!(
                    params = %tick.params,
                    result = %tick.result,
                    fingerprint = %fingerprint,
                    "Tick published"
                );
                Ok(fingerprint)
            }
            Err(source) => {
                metrics::record_cache_failure(metrics::CacheOperation::Set);
                Err(PublishError {
                    fingerprint,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockResponseCache;
    use crate::domain::fingerprint::FingerprintConfig;
    use crate::domain::pricing::PriceProvenance;
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

    fn tick() -> PriceTick {
        PriceTick {
            params: SubscriptionParams::new("EUR", "USD", "BGNL").unwrap(),
            result: Decimal::from_str("1.1001").unwrap(),
            provenance: PriceProvenance::Midpoint,
            stream_established_at: Utc::now(),
            received_at: Utc::now(),
            provider_time: None,
        }
    }

    #[tokio::test]
    async fn publish_writes_under_fingerprint_with_max_age() {
        let expected_key = fingerprinter().fingerprint(&tick().params);
        let expected_value = tick().to_response();

        let mut cache = MockResponseCache::new();
        cache
            .expect_set()
            .withf(move |key, value, ttl| {
                *key == expected_key
                    && value.response.result == expected_value.response.result
                    && *ttl == Duration::from_secs(90)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let publisher =
            TickPublisher::new(Arc::new(cache), fingerprinter(), Duration::from_secs(90));
        let key = publisher.publish(&tick()).await.unwrap();
        assert_eq!(key, fingerprinter().fingerprint(&tick().params));
    }

    #[tokio::test]
    async fn publish_reports_failure_without_retry() {
        let mut cache = MockResponseCache::new();
        cache
            .expect_set()
            .times(1)
            .returning(|_, _, _| Err(CacheError::Unavailable("down".to_string())));

        let publisher =
            TickPublisher::new(Arc::new(cache), fingerprinter(), Duration::from_secs(90));
        let err = publisher.publish(&tick()).await.unwrap_err();
        assert!(matches!(err.source, CacheError::Unavailable(_)));
        assert_eq!(err.fingerprint, fingerprinter().fingerprint(&tick().params));
    }
}
