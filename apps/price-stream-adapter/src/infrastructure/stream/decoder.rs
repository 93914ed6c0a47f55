//! Message Decoder
//!
//! Classifies inbound provider frames as heartbeat, price tick or ignorable
//! noise. The feed is multiplexed across adapters, so most irrelevant
//! frames are expected and are dropped with a reason rather than an error.
//!
//! # Classification (in order)
//!
//! 1. No message type, or type `auth` → ignored
//! 2. No composite identifier, or status not the active sentinel → ignored
//! 3. Heartbeat marker present and stream code matches → heartbeat
//! 4. No value-field object → ignored
//! 5. Stream code differs from the configured stream → ignored
//! 6. Neither midpoint nor both bid and ask → ignored
//! 7. Otherwise → price tick
//!
//! Frames may arrive as a single JSON object or an array of objects.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::schema::WireSchema;
use crate::domain::pricing::{HeartbeatEvent, PriceProvenance, PriceTick, midpoint};
use crate::domain::subscription::SubscriptionParams;

/// Frame-level decode errors (the frame is not JSON at all).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// JSON parsing failed.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an object nor an array.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// Why a message produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Element is not a JSON object.
    NotAnObject,
    /// No message-type field.
    MissingType,
    /// Auth frame outside the open phase.
    AuthFrame,
    /// No composite identifier.
    MissingRecord,
    /// Status is not the active sentinel.
    Inactive,
    /// No value-field object.
    MissingValues,
    /// Stream code belongs to another subscriber.
    StreamMismatch {
        /// Stream code found, if any.
        found: Option<String>,
    },
    /// Neither a midpoint nor a full bid/ask pair.
    NoUsablePrice,
    /// A price field was not a decimal, or the bid/ask midpoint overflowed.
    InvalidPrice(String),
    /// Base/quote/source could not be extracted.
    MalformedRecord(String),
}

impl IgnoreReason {
    /// Short label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::AuthFrame => "auth_frame",
            Self::MissingRecord => "missing_record",
            Self::Inactive => "inactive",
            Self::MissingValues => "missing_values",
            Self::StreamMismatch { .. } => "stream_mismatch",
            Self::NoUsablePrice => "no_usable_price",
            Self::InvalidPrice(_) => "invalid_price",
            Self::MalformedRecord(_) => "malformed_record",
        }
    }
}

/// Result of decoding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// Provider liveness signal for the configured stream.
    Heartbeat(HeartbeatEvent),
    /// Fresh price.
    Tick(PriceTick),
    /// Nothing to do.
    Ignored(IgnoreReason),
}

/// Per-call timestamps the decoder stamps onto ticks.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// When the frame was received.
    pub received_at: DateTime<Utc>,
    /// When the current connection was confirmed established.
    pub established_at: DateTime<Utc>,
}

/// Stateless decoder for one configured stream.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    schema: WireSchema,
    stream: String,
}

impl MessageDecoder {
    /// Create a decoder for a schema and configured stream name.
    #[must_use]
    pub fn new(schema: WireSchema, stream: impl Into<String>) -> Self {
        Self {
            schema,
            stream: stream.into(),
        }
    }

    /// Configured stream name.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Schema in use.
    #[must_use]
    pub const fn schema(&self) -> &WireSchema {
        &self.schema
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error only if the frame is not JSON or is a scalar.
    pub fn decode(
        &self,
        text: &str,
        ctx: &DecodeContext,
    ) -> Result<Vec<DecodedMessage>, DecodeError> {
        let value: Value = serde_json::from_str(text.trim())?;
        match value {
            Value::Array(items) => Ok(items.iter().map(|v| self.decode_value(v, ctx)).collect()),
            Value::Object(_) => Ok(vec![self.decode_value(&value, ctx)]),
            other => Err(DecodeError::InvalidFormat(format!(
                "expected JSON object or array, got: {}",
                truncate(&other.to_string(), 50)
            ))),
        }
    }

    /// Classify a single JSON message.
    #[must_use]
    pub fn decode_value(&self, value: &Value, ctx: &DecodeContext) -> DecodedMessage {
        match self.classify(value, ctx) {
            Ok(message) => message,
            Err(reason) => DecodedMessage::Ignored(reason),
        }
    }

    fn classify(&self, value: &Value, ctx: &DecodeContext) -> Result<DecodedMessage, IgnoreReason> {
        let envelope = &self.schema.envelope;
        let layout = &self.schema.layout;

        let obj = value.as_object().ok_or(IgnoreReason::NotAnObject)?;

        match obj.get(&envelope.message_type).and_then(Value::as_str) {
            None => return Err(IgnoreReason::MissingType),
            Some("auth") => return Err(IgnoreReason::AuthFrame),
            Some(_) => {}
        }

        let record = obj
            .get(&envelope.record)
            .and_then(Value::as_str)
            .ok_or(IgnoreReason::MissingRecord)?;

        if !self.is_active(obj.get(&envelope.status)) {
            return Err(IgnoreReason::Inactive);
        }

        let stream_code = layout.stream_code(record);

        if layout.is_heartbeat(record) && stream_code == Some(self.stream.as_str()) {
            return Ok(DecodedMessage::Heartbeat(HeartbeatEvent {
                stream: self.stream.clone(),
                received_at: ctx.received_at,
            }));
        }

        let values = obj
            .get(&envelope.values)
            .and_then(Value::as_object)
            .ok_or(IgnoreReason::MissingValues)?;

        if stream_code != Some(self.stream.as_str()) {
            return Err(IgnoreReason::StreamMismatch {
                found: stream_code.map(str::to_string),
            });
        }

        let (result, provenance) = self.extract_price(values, record)?;

        let field = |range: super::schema::FieldRange| {
            range
                .extract(record)
                .ok_or_else(|| IgnoreReason::MalformedRecord(record.to_string()))
        };
        let params = SubscriptionParams::new(
            field(layout.base)?,
            field(layout.quote)?,
            field(layout.source)?,
        )
        .map_err(|_| IgnoreReason::MalformedRecord(record.to_string()))?;

        Ok(DecodedMessage::Tick(PriceTick {
            params,
            result,
            provenance,
            stream_established_at: ctx.established_at,
            received_at: ctx.received_at,
            provider_time: self.provider_time(values),
        }))
    }

    fn is_active(&self, status: Option<&Value>) -> bool {
        let active = self.schema.active_status;
        match status {
            Some(Value::Number(n)) => n.as_i64() == Some(active),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(active),
            _ => false,
        }
    }

    fn extract_price(
        &self,
        values: &Map<String, Value>,
        record: &str,
    ) -> Result<(Decimal, PriceProvenance), IgnoreReason> {
        let names = &self.schema.values;

        if let Some(mid) = decimal_field(values, &names.mid_price)? {
            return Ok((mid, PriceProvenance::Midpoint));
        }

        match (
            decimal_field(values, &names.bid)?,
            decimal_field(values, &names.ask)?,
        ) {
            (Some(bid), Some(ask)) => {
                let mid = midpoint(bid, ask).ok_or_else(|| {
                    tracing::debug!(record, "Bid/ask midpoint out of decimal range");
                    IgnoreReason::InvalidPrice(names.bid.clone())
                })?;
                Ok((mid, PriceProvenance::BidAsk { bid, ask }))
            }
            _ => {
                tracing::debug!(record, "Price message has neither midpoint nor bid/ask");
                Err(IgnoreReason::NoUsablePrice)
            }
        }
    }

    fn provider_time(&self, values: &Map<String, Value>) -> Option<DateTime<Utc>> {
        let names = &self.schema.values;
        let date = values.get(&names.active_date).and_then(Value::as_str)?;
        let time = values.get(&names.time_active).and_then(Value::as_str)?;

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"))
            .ok()?;
        let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H%M%S"))
            .ok()?;

        Some(date.and_time(time).and_utc())
    }
}

/// Read an optional decimal field. Numbers go through their shortest
/// textual form so `1.1000` never picks up binary noise.
fn decimal_field(values: &Map<String, Value>, name: &str) -> Result<Option<Decimal>, IgnoreReason> {
    let parsed = match values.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_decimal(s.trim()),
        Some(_) => None,
    };

    parsed
        .map(Some)
        .ok_or_else(|| IgnoreReason::InvalidPrice(name.to_string()))
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
