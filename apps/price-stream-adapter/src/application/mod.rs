//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with the cache, the provider
//! stream and the balance source.

/// Port interfaces for external systems (cache, subscription sink, balances).
pub mod ports;

/// Application services for publishing, refreshing and reading prices.
pub mod services;
