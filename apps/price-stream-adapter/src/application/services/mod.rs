//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TickPublisher`: writes decoded ticks into the response cache
//! - `LivenessRefresher`: extends cache TTLs on provider heartbeats
//! - `FeedProcessor`: routes stream events to the two above
//! - `PriceService`: caller read path over the cache
//! - `lookup_balances`: batched balance reads with per-item warnings

mod balance;
mod price;
mod processor;
mod publisher;
mod refresher;

pub use balance::{BalanceOutcome, BalanceRequest, SupportedAssets, lookup_balances};
pub use price::{AdapterError, ErrorDetail, ErrorResponse, PriceRequest, PriceService};
pub use processor::FeedProcessor;
pub use publisher::{PublishError, TickPublisher};
pub use refresher::{LivenessRefresher, RefreshReport};
