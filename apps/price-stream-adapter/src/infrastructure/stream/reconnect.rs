//! Reconnection Policy
//!
//! Backoff between connection instances. The delay for attempt `n` is
//! `initial_delay * multiplier^n`, capped at `max_delay` and spread by a
//! symmetric jitter band. The policy is reset only once a connection
//! reaches Ready, so a provider that accepts sockets but never acks auth
//! keeps backing off.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ConnectionSettings;

/// Shortest delay ever returned once jitter is applied.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Backoff tuning.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter band as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Take the backoff fields from connection settings; jitter keeps its default.
    #[must_use]
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            max_attempts: settings.max_reconnect_attempts,
            ..Self::default()
        }
    }

    /// Un-jittered delay for a zero-based attempt index.
    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Backoff state across consecutive failed connection instances.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start a fresh policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the cap is reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let base = self.config.base_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(self.spread(base))
    }

    /// Forget past failures after a connection reached Ready.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt cap has been reached.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts != 0 && self.attempts >= self.config.max_attempts
    }

    fn spread(&self, base: Duration) -> Duration {
        let band = self.config.jitter_factor;
        if band <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(-band..=band);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(MIN_DELAY)
            .max(MIN_DELAY)
    }
}

/// Reconnection failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Attempt cap reached without reaching Ready.
    #[error("gave up after {0} reconnection attempts")]
    MaxAttemptsExceeded(u32),
}
