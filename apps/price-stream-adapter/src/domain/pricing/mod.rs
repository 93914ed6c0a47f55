//! Price Tick Types
//!
//! Canonical, codec-agnostic representation of decoded provider data and
//! the response shape written to the cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::SubscriptionParams;

// =============================================================================
// Price Tick
// =============================================================================

/// How a tick's result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceProvenance {
    /// The provider sent a midpoint directly.
    Midpoint,
    /// Computed as `(bid + ask) / 2`.
    BidAsk {
        /// Best bid.
        bid: Decimal,
        /// Best ask.
        ask: Decimal,
    },
}

/// One decoded price update. Immutable; superseded by the next tick for the
/// same subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    /// Subscription the tick belongs to.
    pub params: SubscriptionParams,
    /// Price result.
    pub result: Decimal,
    /// Where the result came from.
    pub provenance: PriceProvenance,
    /// When the provider stream was confirmed established.
    pub stream_established_at: DateTime<Utc>,
    /// When this message was received locally.
    pub received_at: DateTime<Utc>,
    /// Provider-indicated quote time, when present.
    pub provider_time: Option<DateTime<Utc>>,
}

impl PriceTick {
    /// Render the tick as the cached response payload.
    #[must_use]
    pub fn to_response(&self) -> AdapterResponse {
        AdapterResponse {
            params: self.params.clone(),
            response: ResponseBody {
                result: self.result,
                data: ResponseData {
                    result: self.result,
                },
                timestamps: ResponseTimestamps {
                    provider_data_received_unix_ms: self.received_at.timestamp_millis(),
                    provider_data_stream_established_unix_ms: self
                        .stream_established_at
                        .timestamp_millis(),
                    provider_indicated_time_unix_ms: self
                        .provider_time
                        .map(|t| t.timestamp_millis()),
                },
            },
        }
    }
}

/// Midpoint of a bid/ask pair using exact decimal arithmetic.
///
/// `None` when the sum leaves the `Decimal` range.
#[must_use]
pub fn midpoint(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    bid.checked_add(ask)?.checked_div(Decimal::TWO)
}

// =============================================================================
// Heartbeat
// =============================================================================

/// Provider liveness signal for one stream. Carries no price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEvent {
    /// Stream identity extracted from the composite record identifier.
    pub stream: String,
    /// When the heartbeat was received locally.
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// Response Shape
// =============================================================================

/// Cached result for one subscription.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "params": {"base": "EUR", "quote": "USD", "source": "BGNL"},
///   "response": {
///     "result": "1.1001",
///     "data": {"result": "1.1001"},
///     "timestamps": {
///       "providerDataReceivedUnixMs": 1705312800123,
///       "providerDataStreamEstablishedUnixMs": 1705312000000,
///       "providerIndicatedTimeUnixMs": 1705312800000
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResponse {
    /// Subscription parameters.
    pub params: SubscriptionParams,
    /// Result body.
    pub response: ResponseBody,
}

/// Result body of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Price result.
    pub result: Decimal,
    /// Data envelope.
    pub data: ResponseData,
    /// Provenance timestamps.
    pub timestamps: ResponseTimestamps,
}

/// Data envelope of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Price result.
    pub result: Decimal,
}

/// Provenance timestamps in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimestamps {
    /// When the provider message was received locally.
    pub provider_data_received_unix_ms: i64,
    /// When the provider stream was confirmed established.
    pub provider_data_stream_established_unix_ms: i64,
    /// Provider-indicated quote time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_indicated_time_unix_ms: Option<i64>,
}
