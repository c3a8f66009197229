//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, multipliers >= 1, jitter in [0, 1])
//! - Validate bind addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, including on hot reload

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{scope}: failure_threshold must be at least 1")]
    ZeroFailureThreshold { scope: String },

    #[error("retry.max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("retry.backoff_multiplier must be >= 1.0, got {0}")]
    BackoffMultiplierBelowOne(f64),

    #[error("retry.jitter_factor must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),

    #[error("retry.max_delay_ms ({max_ms}) is below retry.initial_delay_ms ({initial_ms})")]
    MaxDelayBelowInitial { initial_ms: u64, max_ms: u64 },

    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Circuit breaker
    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold {
            scope: "circuit_breaker".to_string(),
        });
    }
    for (key, o) in &cb.overrides {
        if o.failure_threshold == Some(0) {
            errors.push(ValidationError::ZeroFailureThreshold {
                scope: format!("circuit_breaker.overrides.{key}"),
            });
        }
    }

    // 2. Retry
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if !(retry.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::BackoffMultiplierBelowOne(retry.backoff_multiplier));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        errors.push(ValidationError::JitterOutOfRange(retry.jitter_factor));
    }
    if let Some(max_ms) = retry.max_delay_ms {
        if max_ms < retry.initial_delay_ms {
            errors.push(ValidationError::MaxDelayBelowInitial {
                initial_ms: retry.initial_delay_ms,
                max_ms,
            });
        }
    }

    // 3. Addresses
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BreakerOverride;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        config.circuit_breaker.overrides.insert(
            "db".to_string(),
            BreakerOverride {
                failure_threshold: Some(0),
                open_timeout_ms: None,
            },
        );
        config.retry.max_attempts = 0;
        config.retry.backoff_multiplier = 0.5;
        config.retry.jitter_factor = 1.5;
        config.retry.initial_delay_ms = 1000;
        config.retry.max_delay_ms = Some(10);
        config.admin.bind_address = "not-an-address".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.contains(&ValidationError::ZeroMaxAttempts));
        assert!(errors.contains(&ValidationError::ZeroFailureThreshold {
            scope: "circuit_breaker.overrides.db".to_string()
        }));
    }

    #[test]
    fn test_disabled_admin_skips_address_check() {
        let mut config = ResilienceConfig::default();
        config.admin.enabled = false;
        config.admin.bind_address = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
