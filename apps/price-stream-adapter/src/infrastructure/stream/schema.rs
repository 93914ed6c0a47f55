//! Wire Schema Descriptors
//!
//! Field names and composite-identifier offsets for the provider feed.
//! The offsets are a contract with the upstream provider: changing any
//! range is a breaking protocol change. They live here as data so a
//! second provider layout is a new descriptor, not a new decoder.
//!
//! # Default Record Layout
//!
//! ```text
//! offset  0         3         6 7          11 12           18
//!         | base    | quote   |.| source    |:| stream      |
//!         E U R     U S D     . B G N L     : F X S P O T
//!
//! heartbeat: H B H H H at 0..5, stream code at 12..18
//!         H B H H H 0 . 0 0 0 0 : F X S P O T
//! ```

/// Byte range within a composite record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    start: usize,
    end: usize,
}

impl FieldRange {
    /// Create a range `[start, end)`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Width of the range in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check whether the range is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extract the substring, or `None` if the record is too short or the
    /// range splits a character.
    #[must_use]
    pub fn extract<'a>(&self, record: &'a str) -> Option<&'a str> {
        record.get(self.start..self.end)
    }
}

/// Fixed offset ranges within the composite record identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Heartbeat marker value.
    pub heartbeat_marker: String,
    /// Where the heartbeat marker sits.
    pub heartbeat: FieldRange,
    /// Stream code.
    pub stream: FieldRange,
    /// Base instrument.
    pub base: FieldRange,
    /// Quote instrument.
    pub quote: FieldRange,
    /// Source identifier.
    pub source: FieldRange,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            heartbeat_marker: "HBHHH".to_string(),
            heartbeat: FieldRange::new(0, 5),
            stream: FieldRange::new(12, 18),
            base: FieldRange::new(0, 3),
            quote: FieldRange::new(3, 6),
            source: FieldRange::new(7, 11),
        }
    }
}

impl RecordLayout {
    /// Check whether a record carries the heartbeat marker.
    #[must_use]
    pub fn is_heartbeat(&self, record: &str) -> bool {
        self.heartbeat.extract(record) == Some(self.heartbeat_marker.as_str())
    }

    /// Stream code embedded in a record.
    #[must_use]
    pub fn stream_code<'a>(&self, record: &'a str) -> Option<&'a str> {
        self.stream.extract(record)
    }
}

/// Envelope field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFields {
    /// Message type.
    pub message_type: String,
    /// Status (active sentinel).
    pub status: String,
    /// Composite record identifier.
    pub record: String,
    /// Value-field object.
    pub values: String,
}

/// Field names inside the value-field object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFields {
    /// Provider-indicated date.
    pub active_date: String,
    /// Provider-indicated time of day.
    pub time_active: String,
    /// Best bid.
    pub bid: String,
    /// Best ask.
    pub ask: String,
    /// Direct midpoint.
    pub mid_price: String,
}

impl Default for ValueFields {
    fn default() -> Self {
        Self {
            active_date: "activeDate".to_string(),
            time_active: "timeActive".to_string(),
            bid: "bid".to_string(),
            ask: "ask".to_string(),
            mid_price: "midPrice".to_string(),
        }
    }
}

/// Complete descriptor consumed by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSchema {
    /// Envelope field names.
    pub envelope: EnvelopeFields,
    /// Value field names.
    pub values: ValueFields,
    /// Composite identifier offsets.
    pub layout: RecordLayout,
    /// Status value meaning "active".
    pub active_status: i64,
}

impl Default for WireSchema {
    fn default() -> Self {
        Self::compact()
    }
}

impl WireSchema {
    /// Short envelope names: `type`, `sta`, `rec`, `fvs`.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            envelope: EnvelopeFields {
                message_type: "type".to_string(),
                status: "sta".to_string(),
                record: "rec".to_string(),
                values: "fvs".to_string(),
            },
            values: ValueFields::default(),
            layout: RecordLayout::default(),
            active_status: 1,
        }
    }

    /// Long envelope names: `type`, `status`, `streamId`, `fields`.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            envelope: EnvelopeFields {
                message_type: "type".to_string(),
                status: "status".to_string(),
                record: "streamId".to_string(),
                values: "fields".to_string(),
            },
            ..Self::compact()
        }
    }

    /// Look up a preset by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "compact" => Some(Self::compact()),
            "verbose" => Some(Self::verbose()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_extracts_fields() {
        let layout = RecordLayout::default();
        let record = "EURUSD.BGNL:FXSPOT";
        assert_eq!(layout.base.extract(record), Some("EUR"));
        assert_eq!(layout.quote.extract(record), Some("USD"));
        assert_eq!(layout.source.extract(record), Some("BGNL"));
        assert_eq!(layout.stream_code(record), Some("FXSPOT"));
        assert!(!layout.is_heartbeat(record));
    }

    #[test]
    fn heartbeat_marker_detected() {
        let layout = RecordLayout::default();
        let record = "HBHHH0.0000:FXSPOT";
        assert!(layout.is_heartbeat(record));
        assert_eq!(layout.stream_code(record), Some("FXSPOT"));
    }

    #[test]
    fn short_record_extracts_nothing() {
        let layout = RecordLayout::default();
        assert_eq!(layout.stream_code("EURUSD"), None);
        assert!(!layout.is_heartbeat("HB"));
    }

    #[test]
    fn range_never_splits_characters() {
        let range = FieldRange::new(0, 2);
        assert_eq!(range.extract("€UR"), None);
        assert_eq!(range.len(), 2);
        assert!(FieldRange::new(3, 3).is_empty());
    }

    #[test]
    fn presets_by_name() {
        assert_eq!(WireSchema::from_name("COMPACT"), Some(WireSchema::compact()));
        let verbose = WireSchema::from_name("verbose").unwrap();
        assert_eq!(verbose.envelope.record, "streamId");
        assert_eq!(verbose.envelope.values, "fields");
        assert_eq!(verbose.layout, RecordLayout::default());
        assert!(WireSchema::from_name("xml").is_none());
    }
}
