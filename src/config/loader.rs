//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply `RESILIENCE_*` overrides, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ResilienceConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn load_from_env() -> Result<ResilienceConfig, ConfigError> {
    let mut config = ResilienceConfig::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse and validate a TOML document without touching the environment.
pub fn parse_config(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut ResilienceConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides read through `lookup`; unset variables leave the field alone.
pub fn apply_overrides_from<L>(config: &mut ResilienceConfig, lookup: L) -> Result<(), ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let cb = &mut config.circuit_breaker;
    set(&lookup, "RESILIENCE_FAILURE_THRESHOLD", &mut cb.failure_threshold)?;
    set(&lookup, "RESILIENCE_OPEN_TIMEOUT_MS", &mut cb.open_timeout_ms)?;

    let retry = &mut config.retry;
    set(&lookup, "RESILIENCE_RETRY_MAX_ATTEMPTS", &mut retry.max_attempts)?;
    set(&lookup, "RESILIENCE_RETRY_INITIAL_DELAY_MS", &mut retry.initial_delay_ms)?;
    set(&lookup, "RESILIENCE_RETRY_BACKOFF_MULTIPLIER", &mut retry.backoff_multiplier)?;
    set(&lookup, "RESILIENCE_RETRY_JITTER", &mut retry.jitter_factor)?;
    if let Some(raw) = lookup("RESILIENCE_RETRY_MAX_DELAY_MS") {
        retry.max_delay_ms = parse_var("RESILIENCE_RETRY_MAX_DELAY_MS", &raw).map(Some)?;
    }

    if let Some(addr) = lookup("RESILIENCE_ADMIN_BIND") {
        config.admin.bind_address = addr;
    }
    if let Some(level) = lookup("RESILIENCE_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    set(&lookup, "RESILIENCE_METRICS_ENABLED", &mut config.observability.metrics_enabled)?;

    Ok(())
}

fn set<L, T>(lookup: &L, var: &'static str, field: &mut T) -> Result<(), ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *field = parse_var(var, &raw)?;
    }
    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_parse_config_document() {
        let config = parse_config(
            r#"
            [circuit_breaker]
            failure_threshold = 3
            open_timeout_ms = 5000

            [retry]
            max_attempts = 2
            initial_delay_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_config("[retry\nmax_attempts = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_lists_all_problems() {
        let err = parse_config("[retry]\nmax_attempts = 0\njitter_factor = 2.0").unwrap_err();
        match &err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = ResilienceConfig::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("RESILIENCE_FAILURE_THRESHOLD", "7"),
                ("RESILIENCE_RETRY_MAX_DELAY_MS", "900"),
                ("RESILIENCE_LOG_LEVEL", "debug"),
                ("RESILIENCE_METRICS_ENABLED", "false"),
            ]),
        )
        .unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 7);
        assert_eq!(config.retry.max_delay_ms, Some(900));
        assert_eq!(config.observability.log_level, "debug");
        assert!(!config.observability.metrics_enabled);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = ResilienceConfig::default();
        let err = apply_overrides_from(&mut config, env(&[("RESILIENCE_OPEN_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "RESILIENCE_OPEN_TIMEOUT_MS", .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let name = format!("resilience-loader-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        fs::write(&path, "[circuit_breaker]\nfailure_threshold = 9\n").unwrap();
        let config = load_config(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(config.circuit_breaker.failure_threshold, 9);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
