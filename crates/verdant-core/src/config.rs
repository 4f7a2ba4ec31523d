//! Client core configuration.
//!
//! The backend endpoint comes from the `VERDANT_ENDPOINT` environment
//! variable with a hardcoded local fallback; everything else has fixed
//! defaults matching the deployed backend's expectations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fallback backend endpoint when `VERDANT_ENDPOINT` is unset.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000";

/// Environment variable overriding the backend endpoint.
pub const ENDPOINT_ENV_VAR: &str = "VERDANT_ENDPOINT";

/// Configuration consumed by the connection manager and command dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Backend endpoint URL.
    pub endpoint: String,
    /// Maximum number of reconnection attempts before entering `Failed`.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub base_retry_delay: Duration,
    /// Multiplier applied per attempt for exponential backoff.
    pub backoff_multiplier: f64,
    /// Ceiling on the computed retry delay.
    pub max_retry_delay: Duration,
    /// Watchdog window for a single connection attempt.
    pub connect_timeout: Duration,
    /// Window within which a queued command must be acknowledged.
    pub command_timeout: Duration,
    /// Capacity of the alert ring buffer.
    pub alert_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_reconnect_attempts: 5,
            base_retry_delay: Duration::from_millis(5000),
            backoff_multiplier: 1.5,
            max_retry_delay: Duration::from_millis(20_000),
            connect_timeout: Duration::from_millis(20_000),
            command_timeout: Duration::from_secs(300),
            alert_capacity: 10,
        }
    }
}

impl CoreConfig {
    /// Build a configuration from the environment, falling back to
    /// [`DEFAULT_ENDPOINT`] when `VERDANT_ENDPOINT` is unset or empty.
    pub fn from_env() -> Self {
        let endpoint = std::env::var(ENDPOINT_ENV_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Delay before retry attempt `attempt` (1-based):
    /// `base * multiplier^(attempt - 1)`, capped at the ceiling.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay_ms = self.base_retry_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 1);
        Duration::from_millis(delay_ms as u64).min(self.max_retry_delay)
    }

    /// Validate the configuration and return an error if invalid.
    ///
    /// Checks that:
    /// - `endpoint` is non-empty
    /// - `max_reconnect_attempts` is >= 1
    /// - `backoff_multiplier` is >= 1.0
    /// - `base_retry_delay` is > 0 and `max_retry_delay` >= `base_retry_delay`
    /// - `alert_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::invalid_config("endpoint must not be empty"));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(Error::invalid_config("max_reconnect_attempts must be >= 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if self.base_retry_delay.is_zero() {
            return Err(Error::invalid_config("base_retry_delay must be > 0"));
        }
        if self.max_retry_delay < self.base_retry_delay {
            return Err(Error::invalid_config(
                "max_retry_delay must be >= base_retry_delay",
            ));
        }
        if self.alert_capacity == 0 {
            return Err(Error::invalid_config("alert_capacity must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.base_retry_delay, Duration::from_millis(5000));
        assert_eq!(config.command_timeout, Duration::from_secs(300));
        assert_eq!(config.alert_capacity, 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_retry_delay_formula() {
        let config = CoreConfig::default();
        // min(5000 * 1.5^(k-1), 20000) for k = 1..6
        assert_eq!(config.retry_delay(1), Duration::from_millis(5000));
        assert_eq!(config.retry_delay(2), Duration::from_millis(7500));
        assert_eq!(config.retry_delay(3), Duration::from_millis(11_250));
        assert_eq!(config.retry_delay(4), Duration::from_millis(16_875));
        assert_eq!(config.retry_delay(5), Duration::from_millis(20_000));
        assert_eq!(config.retry_delay(6), Duration::from_millis(20_000));
    }

    #[test]
    fn test_retry_delay_clamps_attempt_zero() {
        let config = CoreConfig::default();
        assert_eq!(config.retry_delay(0), config.retry_delay(1));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CoreConfig::default();
        config.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.max_reconnect_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.max_retry_delay = Duration::from_millis(1);
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.endpoint = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
