//! Configuration Module
//!
//! Configuration loading for the adapter service.

mod settings;

pub use settings::{
    AdapterConfig, CacheSettings, ConfigError, ConnectionSettings, ProviderSettings,
    ServerSettings,
};
