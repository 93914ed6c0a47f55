//! Subscription Tracking
//!
//! Domain types for the set of instrument streams callers want priced.
//!
//! # Design
//!
//! The registry is append-only and read-mostly after startup. It is read
//! in two places:
//! - by the connection manager, to emit a subscribe directive per tuple
//!   after every successful authentication
//! - by the liveness refresher, to enumerate every cache fingerprint that a
//!   provider heartbeat should keep alive
//!
//! Enumeration takes a snapshot under the read lock, so a late
//! registration never races a refresh pass half-way through.

use std::collections::HashSet;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Parameter Tuple
// =============================================================================

/// Identity of one logical price stream: base, quote and source.
///
/// Field values are upper-cased on construction so that tuples built from
/// caller input, from configuration and from decoded provider records all
/// compare equal and fingerprint identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionParams {
    base: String,
    quote: String,
    source: String,
}

impl SubscriptionParams {
    /// Create a new parameter tuple.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is empty after trimming.
    pub fn new(
        base: impl AsRef<str>,
        quote: impl AsRef<str>,
        source: impl AsRef<str>,
    ) -> Result<Self, ParamsError> {
        Ok(Self {
            base: normalize("base", base.as_ref())?,
            quote: normalize("quote", quote.as_ref())?,
            source: normalize("source", source.as_ref())?,
        })
    }

    /// Parse a `BASE/QUOTE/SOURCE` triple.
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not have exactly three
    /// non-empty `/`-separated parts.
    pub fn parse(s: &str) -> Result<Self, ParamsError> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [base, quote, source] => Self::new(base, quote, source),
            _ => Err(ParamsError::Malformed(s.to_string())),
        }
    }

    /// Base instrument.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote instrument.
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Source identifier.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SubscriptionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.base, self.quote, self.source)
    }
}

fn normalize(field: &'static str, value: &str) -> Result<String, ParamsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ParamsError::EmptyField(field));
    }
    Ok(trimmed.to_uppercase())
}

/// Invalid subscription parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    /// A required field was empty.
    #[error("subscription field `{0}` cannot be empty")]
    EmptyField(&'static str),

    /// The tuple could not be parsed.
    #[error("malformed subscription `{0}`: expected BASE/QUOTE/SOURCE")]
    Malformed(String),
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Registration order, used for directive emission.
    ordered: Vec<SubscriptionParams>,
    /// Membership index.
    index: HashSet<SubscriptionParams>,
}

/// Thread-safe, append-only set of active subscription tuples.
///
/// # Example
///
/// ```rust
/// use price_stream_adapter::domain::subscription::{SubscriptionParams, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let eur = SubscriptionParams::new("eur", "usd", "bgnl").unwrap();
///
/// assert!(registry.register(eur.clone()));
/// // Registering again is a no-op
/// assert!(!registry.register(eur));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with tuples (duplicates collapse).
    #[must_use]
    pub fn with_params(params: impl IntoIterator<Item = SubscriptionParams>) -> Self {
        let registry = Self::new();
        for p in params {
            registry.register(p);
        }
        registry
    }

    /// Register a tuple.
    ///
    /// Returns `true` if the tuple was not tracked before.
    pub fn register(&self, params: SubscriptionParams) -> bool {
        let mut state = self.state.write();
        if state.index.contains(&params) {
            return false;
        }
        state.index.insert(params.clone());
        state.ordered.push(params);
        true
    }

    /// Snapshot of every registered tuple, in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<SubscriptionParams> {
        self.state.read().ordered.clone()
    }

    /// Check whether a tuple is registered.
    #[must_use]
    pub fn contains(&self, params: &SubscriptionParams) -> bool {
        self.state.read().index.contains(params)
    }

    /// Number of registered tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().ordered.len()
    }

    /// Check whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().ordered.is_empty()
    }
}
