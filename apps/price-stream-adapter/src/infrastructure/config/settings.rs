//! Adapter Configuration Settings
//!
//! Configuration types for the price stream adapter, loaded from
//! environment variables.

use std::time::Duration;

use crate::domain::subscription::SubscriptionParams;
use crate::infrastructure::stream::{Credentials, StreamTemplate, WireSchema};

/// Provider connection identity.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// Provider credentials.
    pub credentials: Credentials,
    /// Configured stream name.
    pub stream_name: String,
    /// Subscribe stream-id template.
    pub template: StreamTemplate,
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Transport ping interval.
    pub ping_interval: Duration,
    /// Time without traffic before the connection is considered dead.
    pub ping_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Backoff multiplier.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL applied on writes and heartbeat refreshes.
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::from_millis(90_000),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8080 }
    }
}

/// Complete adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Adapter identity used in cache fingerprints.
    pub adapter_name: String,
    /// Provider connection identity.
    pub provider: ProviderSettings,
    /// WebSocket connection settings.
    pub connection: ConnectionSettings,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Wire schema preset.
    pub schema: WireSchema,
    /// Tuples registered at startup.
    pub subscriptions: Vec<SubscriptionParams>,
}

impl AdapterConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, empty, or
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing, empty, or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = required(&lookup, "WS_API_ENDPOINT")?;
        let user = required(&lookup, "API_USERNAME")?;
        let pass = required(&lookup, "API_PASSWORD")?;
        let stream_name = required(&lookup, "STREAM_NAME")?;

        let mode = lookup("API_MODE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "stream".to_string());
        let adapter_name = lookup("ADAPTER_NAME")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "price-stream-adapter".to_string());

        let schema = match lookup("WIRE_SCHEMA") {
            Some(name) => WireSchema::from_name(&name).ok_or_else(|| ConfigError::Invalid {
                key: "WIRE_SCHEMA".to_string(),
                message: format!("unknown schema `{name}` (expected compact or verbose)"),
            })?,
            None => WireSchema::default(),
        };

        if stream_name.len() != schema.layout.stream.len() {
            return Err(ConfigError::Invalid {
                key: "STREAM_NAME".to_string(),
                message: format!(
                    "`{stream_name}` must be exactly {} characters",
                    schema.layout.stream.len()
                ),
            });
        }

        let template = match lookup("STREAM_TEMPLATE").filter(|v| !v.trim().is_empty()) {
            Some(pattern) => StreamTemplate::parse(pattern.trim()).map_err(|e| ConfigError::Invalid {
                key: "STREAM_TEMPLATE".to_string(),
                message: e.to_string(),
            })?,
            None => StreamTemplate::default(),
        };

        let subscriptions = lookup("SUBSCRIPTIONS")
            .map(|raw| parse_subscriptions(&raw))
            .transpose()?
            .unwrap_or_default();

        let credentials =
            Credentials::new(user, pass, mode).map_err(|e| ConfigError::Invalid {
                key: "API_USERNAME".to_string(),
                message: e.to_string(),
            })?;

        let connection = ConnectionSettings {
            ping_interval: parse_duration_secs(
                &lookup,
                "PING_INTERVAL_SECS",
                ConnectionSettings::default().ping_interval,
            ),
            ping_timeout: parse_duration_secs(
                &lookup,
                "PING_TIMEOUT_SECS",
                ConnectionSettings::default().ping_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "RECONNECT_DELAY_INITIAL_MS",
                ConnectionSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "RECONNECT_DELAY_MAX_SECS",
                ConnectionSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "RECONNECT_DELAY_MULTIPLIER",
                ConnectionSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                ConnectionSettings::default().max_reconnect_attempts,
            ),
        };

        let cache = CacheSettings {
            max_age: parse_duration_millis(
                &lookup,
                "CACHE_MAX_AGE_MS",
                CacheSettings::default().max_age,
            ),
        };
        if cache.max_age.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CACHE_MAX_AGE_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let server = ServerSettings {
            health_port: parse_or(&lookup, "HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            adapter_name,
            provider: ProviderSettings {
                endpoint,
                credentials,
                stream_name,
                template,
            },
            connection,
            cache,
            server,
            schema,
            subscriptions,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: String,
        /// What was wrong.
        message: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_subscriptions(raw: &str) -> Result<Vec<SubscriptionParams>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            SubscriptionParams::parse(entry).map_err(|e| ConfigError::Invalid {
                key: "SUBSCRIPTIONS".to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
