//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every field has a
//! default, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerSettings, RetryPolicy};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Admin HTTP surface.
    pub admin: AdminConfig,

    /// Circuit breaker defaults and per-key overrides.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Default retry policy.
    pub retry: RetryConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a breaker.
    pub failure_threshold: u32,

    /// Milliseconds a breaker stays open before admitting a probe.
    pub open_timeout_ms: u64,

    /// Per-key overrides, e.g. `[circuit_breaker.overrides.payments]`.
    pub overrides: BTreeMap<String, BreakerOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
            overrides: BTreeMap::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn default_settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }

    /// Overrides resolved against the defaults.
    pub fn override_settings(&self) -> Vec<(String, BreakerSettings)> {
        let defaults = self.default_settings();
        self.overrides
            .iter()
            .map(|(key, o)| (key.clone(), o.resolve(defaults)))
            .collect()
    }
}

/// Per-key breaker settings; unset fields inherit the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub open_timeout_ms: Option<u64>,
}

impl BreakerOverride {
    pub fn resolve(&self, defaults: BreakerSettings) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            open_timeout: self
                .open_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.open_timeout),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first.
    pub max_attempts: u32,

    pub initial_delay_ms: u64,

    pub backoff_multiplier: f64,

    /// Upper bound on a single delay; absent means unbounded.
    pub max_delay_ms: Option<u64>,

    /// Random spread applied to each delay, in [0, 1].
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: Some(30_000),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_max_delay(self.max_delay_ms.map(Duration::from_millis))
            .with_jitter(self.jitter_factor)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Level used when `RUST_LOG` is unset.
    pub log_level: String,

    pub metrics_enabled: bool,

    /// Prometheus scrape address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
