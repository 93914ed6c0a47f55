//! Domain Layer - Core pricing types and business rules.
//!
//! Pure types with no I/O: subscription identity, price ticks, heartbeats
//! and cache fingerprints.

/// Cache key derivation.
pub mod fingerprint;

/// Price ticks, heartbeats and the cached response shape.
pub mod pricing;

/// Subscription tuples and the append-only registry.
pub mod subscription;
