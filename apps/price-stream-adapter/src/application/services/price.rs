//! Price Service
//!
//! In-process read path for callers: validate the requested tuple, make
//! sure the stream is subscribed, and answer from the response cache.
//! Failures come back as a structured error result, never a provider
//! message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::ports::{CacheError, ResponseCache, SubscriptionSink};
use crate::domain::fingerprint::Fingerprinter;
use crate::domain::pricing::AdapterResponse;
use crate::domain::subscription::{ParamsError, SubscriptionParams};

// =============================================================================
// Request / Error Types
// =============================================================================

/// Raw caller request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriceRequest {
    /// Base instrument.
    pub base: String,
    /// Quote instrument.
    pub quote: String,
    /// Source identifier.
    pub source: String,
}

/// Request-facing errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The request did not name a valid tuple.
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    /// Nothing cached for the tuple yet.
    #[error("no price cached for {0}; the stream may still be warming up")]
    NoData(SubscriptionParams),

    /// The cache could not be read.
    #[error("cache read failed: {0}")]
    Cache(#[from] CacheError),
}

impl AdapterError {
    /// HTTP-style status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidParams(_) => 400,
            Self::NoData(_) => 504,
            Self::Cache(_) => 502,
        }
    }

    /// Error class name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "InputValidationError",
            Self::NoData(_) => "NoDataError",
            Self::Cache(_) => "CacheError",
        }
    }

    /// Render the structured error result.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: "errored",
            status_code: self.status_code(),
            error: ErrorDetail {
                name: self.name(),
                message: self.to_string(),
            },
        }
    }
}

/// Structured error result.
///
/// # Wire Format (JSON)
/// ```json
/// {"status": "errored", "statusCode": 504, "error": {"name": "NoDataError", "message": "..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `errored`.
    pub status: &'static str,
    /// Status code.
    pub status_code: u16,
    /// Error detail.
    pub error: ErrorDetail,
}

/// Name and message of an error result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Error class name.
    pub name: &'static str,
    /// Human-readable message.
    pub message: String,
}

// =============================================================================
// Service
// =============================================================================

/// Answers price reads from the cache, registering new tuples on the way.
pub struct PriceService {
    sink: Arc<dyn SubscriptionSink>,
    cache: Arc<dyn ResponseCache>,
    fingerprinter: Fingerprinter,
}

impl PriceService {
    /// Create a price service.
    #[must_use]
    pub fn new(
        sink: Arc<dyn SubscriptionSink>,
        cache: Arc<dyn ResponseCache>,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            sink,
            cache,
            fingerprinter,
        }
    }

    /// Read the cached result for a raw request.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for a malformed request, otherwise see
    /// [`PriceService::read_params`].
    pub async fn read(&self, request: &PriceRequest) -> Result<AdapterResponse, AdapterError> {
        let params = SubscriptionParams::new(&request.base, &request.quote, &request.source)?;
        self.read_params(params).await
    }

    /// Read the cached result for a tuple, subscribing it if new.
    ///
    /// # Errors
    ///
    /// `NoData` if nothing is cached yet, `Cache` if the read fails.
    pub async fn read_params(
        &self,
        params: SubscriptionParams,
    ) -> Result<AdapterResponse, AdapterError> {
        let fingerprint = self.fingerprinter.fingerprint(&params);

        if self.sink.subscribe(params.clone()) {
            tracing::debug!(params = %params, "New tuple subscribed on read");
        }

        match self.cache.get(&fingerprint).await? {
            Some(response) => Ok(response),
            None => Err(AdapterError::NoData(params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{MockResponseCache, MockSubscriptionSink};
    use crate::domain::fingerprint::FingerprintConfig;
    use crate::domain::pricing::{PriceProvenance, PriceTick};

    fn fingerprinter() -> Fingerprinter {
        Fingerprinter::new(
            "test-adapter",
            FingerprintConfig {
                stream: "FXSPOT".to_string(),
                endpoint: "wss://example.test".to_string(),
            },
        )
    }

    fn request(base: &str) -> PriceRequest {
        PriceRequest {
            base: base.to_string(),
            quote: "usd".to_string(),
            source: "bgnl".to_string(),
        }
    }

    fn cached() -> AdapterResponse {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        PriceTick {
            params: SubscriptionParams::new("EUR", "USD", "BGNL").unwrap(),
            result: Decimal::from_str("1.1001").unwrap(),
            provenance: PriceProvenance::Midpoint,
            stream_established_at: at,
            received_at: at,
            provider_time: None,
        }
        .to_response()
    }

    #[tokio::test]
    async fn hit_returns_cached_response() {
        let expected_key =
            fingerprinter().fingerprint(&SubscriptionParams::new("EUR", "USD", "BGNL").unwrap());

        let mut sink = MockSubscriptionSink::new();
        sink.expect_subscribe().times(1).returning(|_| false);
        let mut cache = MockResponseCache::new();
        cache
            .expect_get()
            .withf(move |key| *key == expected_key)
            .returning(|_| Ok(Some(cached())));

        let service = PriceService::new(Arc::new(sink), Arc::new(cache), fingerprinter());
        let response = service.read(&request("eur")).await.unwrap();
        assert_eq!(response, cached());
    }

    #[tokio::test]
    async fn miss_subscribes_and_reports_no_data() {
        let mut sink = MockSubscriptionSink::new();
        sink.expect_subscribe()
            .withf(|params| params.to_string() == "GBP/USD/BGNL")
            .times(1)
            .returning(|_| true);
        let mut cache = MockResponseCache::new();
        cache.expect_get().returning(|_| Ok(None));

        let service = PriceService::new(Arc::new(sink), Arc::new(cache), fingerprinter());
        let err = service.read(&request("gbp")).await.unwrap_err();
        assert!(matches!(err, AdapterError::NoData(_)));

        let body = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(body["status"], "errored");
        assert_eq!(body["statusCode"], 504);
        assert_eq!(body["error"]["name"], "NoDataError");
    }

    #[tokio::test]
    async fn invalid_request_never_subscribes() {
        let mut sink = MockSubscriptionSink::new();
        sink.expect_subscribe().never();
        let mut cache = MockResponseCache::new();
        cache.expect_get().never();

        let service = PriceService::new(Arc::new(sink), Arc::new(cache), fingerprinter());
        let err = service.read(&request("  ")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_response().error.name, "InputValidationError");
    }

    #[tokio::test]
    async fn cache_failure_is_structured() {
        let mut sink = MockSubscriptionSink::new();
        sink.expect_subscribe().returning(|_| false);
        let mut cache = MockResponseCache::new();
        cache
            .expect_get()
            .returning(|_| Err(CacheError::Unavailable("down".to_string())));

        let service = PriceService::new(Arc::new(sink), Arc::new(cache), fingerprinter());
        let err = service.read(&request("eur")).await.unwrap_err();
        assert_eq!(err.to_response().status_code, 502);
    }
}
