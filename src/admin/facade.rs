//! Read and administrative surface over the resilience components.
//!
//! # Responsibilities
//! - Aggregate breaker and error snapshots into a health report
//! - Reset breakers and clear error statistics
//! - Report the defaults new breakers and retries are created with
//! - Run self-tests that exercise each component end to end
//!
//! # Design Decisions
//! - Never mutates breaker state except through `reset`
//! - Snapshot maps are ordered (BTreeMap) so responses are stable
//! - Transport-agnostic; the HTTP handlers only delegate here

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::resilience::{
    epoch_millis, BreakerSettings, CircuitBreakerRegistry, CircuitBreakerStatus, CircuitState,
    ErrorRecord, ErrorStatistics, RetryExecutor, RetryStats,
};

/// Breaker key and component name used by self-tests.
pub const SELF_TEST_KEY: &str = "SelfTest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: OverallStatus,
    pub circuit_breakers: BreakerSummary,
    pub errors: ErrorSummary,
    pub retries: RetryStats,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSummary {
    pub total: usize,
    pub open: usize,
    pub half_open: usize,
    pub healthy: usize,
    pub statuses: BTreeMap<String, CircuitBreakerStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total_error_types: usize,
    pub total_error_count: u64,
    pub statistics: BTreeMap<String, ErrorRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetAck {
    pub message: &'static str,
    pub service_name: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAck {
    pub message: &'static str,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub circuit_breaker: BreakerDefaultsView,
    pub retry: RetryDefaultsView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerDefaultsView {
    pub default_failure_threshold: u32,
    pub default_open_timeout_ms: u64,
    pub overrides: BTreeMap<String, BreakerSettingsView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSettingsView {
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
}

impl From<BreakerSettings> for BreakerSettingsView {
    fn from(s: BreakerSettings) -> Self {
        Self {
            failure_threshold: s.failure_threshold,
            open_timeout_ms: s.open_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryDefaultsView {
    pub default_max_attempts: u32,
    pub default_initial_delay_ms: u64,
    pub default_backoff_multiplier: f64,
    pub default_max_delay_ms: Option<u64>,
    pub default_jitter_factor: f64,
}

/// Component exercised by a self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestFeature {
    CircuitBreaker,
    Retry,
    ErrorHandling,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown test feature: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for SelfTestFeature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "circuit-breaker" => Ok(SelfTestFeature::CircuitBreaker),
            "retry" => Ok(SelfTestFeature::Retry),
            "error-handling" => Ok(SelfTestFeature::ErrorHandling),
            other => Err(UnknownFeature(other.to_string())),
        }
    }
}

impl SelfTestFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            SelfTestFeature::CircuitBreaker => "circuit-breaker",
            SelfTestFeature::Retry => "retry",
            SelfTestFeature::ErrorHandling => "error-handling",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    pub feature: &'static str,
    pub should_fail: bool,
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<CircuitState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub error_generated: bool,
    pub timestamp: u64,
}

impl SelfTestReport {
    fn new(feature: SelfTestFeature, should_fail: bool) -> Self {
        Self {
            feature: feature.as_str(),
            should_fail,
            success: false,
            result: String::new(),
            circuit_state: None,
            failure_count: None,
            attempts: None,
            error_generated: false,
            timestamp: epoch_millis(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringFacade {
    breakers: Arc<CircuitBreakerRegistry>,
    errors: Arc<ErrorStatistics>,
    retries: Arc<RetryExecutor>,
}

impl MonitoringFacade {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        errors: Arc<ErrorStatistics>,
        retries: Arc<RetryExecutor>,
    ) -> Self {
        Self {
            breakers,
            errors,
            retries,
        }
    }

    /// `HEALTHY` when no breaker is open, otherwise `DEGRADED`.
    pub fn health(&self) -> HealthReport {
        let statuses = self.circuit_breakers();
        let open = count_in(&statuses, CircuitState::Open);
        let half_open = count_in(&statuses, CircuitState::HalfOpen);
        let statistics = self.errors();

        HealthReport {
            status: if open == 0 {
                OverallStatus::Healthy
            } else {
                OverallStatus::Degraded
            },
            circuit_breakers: BreakerSummary {
                total: statuses.len(),
                open,
                half_open,
                healthy: statuses.len() - open - half_open,
                statuses,
            },
            errors: ErrorSummary {
                total_error_types: statistics.len(),
                total_error_count: statistics.values().map(|r| r.occurrence_count).sum(),
                statistics,
            },
            retries: self.retries.stats(),
            timestamp: epoch_millis(),
        }
    }

    pub fn circuit_breakers(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.breakers.get_all_statuses().into_iter().collect()
    }

    pub fn circuit_breaker(&self, key: &str) -> CircuitBreakerStatus {
        self.breakers.get_status(key)
    }

    pub fn reset_circuit_breaker(&self, key: &str) -> ResetAck {
        self.breakers.reset(key);
        ResetAck {
            message: "Circuit breaker reset successfully",
            service_name: key.to_string(),
            timestamp: epoch_millis(),
        }
    }

    pub fn errors(&self) -> BTreeMap<String, ErrorRecord> {
        self.errors.get_error_statistics().into_iter().collect()
    }

    pub fn clear_errors(&self) -> ClearAck {
        self.errors.clear_error_statistics();
        ClearAck {
            message: "Error statistics cleared successfully",
            timestamp: epoch_millis(),
        }
    }

    pub fn config(&self) -> ConfigView {
        let defaults = self.breakers.default_settings();
        let retry = self.retries.default_policy();
        ConfigView {
            circuit_breaker: BreakerDefaultsView {
                default_failure_threshold: defaults.failure_threshold,
                default_open_timeout_ms: defaults.open_timeout.as_millis() as u64,
                overrides: self
                    .breakers
                    .overrides()
                    .into_iter()
                    .map(|(key, s)| (key, s.into()))
                    .collect(),
            },
            retry: RetryDefaultsView {
                default_max_attempts: retry.max_attempts,
                default_initial_delay_ms: retry.initial_delay.as_millis() as u64,
                default_backoff_multiplier: retry.backoff_multiplier,
                default_max_delay_ms: retry.max_delay.map(|d| d.as_millis() as u64),
                default_jitter_factor: retry.jitter_factor,
            },
        }
    }

    /// Exercise one component with a simulated operation.
    pub async fn run_self_test(
        &self,
        feature: &str,
        should_fail: bool,
    ) -> Result<SelfTestReport, UnknownFeature> {
        let feature: SelfTestFeature = feature.parse()?;
        let mut report = SelfTestReport::new(feature, should_fail);

        match feature {
            SelfTestFeature::CircuitBreaker => {
                let outcome = self
                    .breakers
                    .execute_async(
                        SELF_TEST_KEY,
                        || async move {
                            if should_fail {
                                Err("Simulated service failure")
                            } else {
                                Ok("Success")
                            }
                        },
                        || async { "Fallback" },
                    )
                    .await;
                let status = self.breakers.get_status(SELF_TEST_KEY);
                report.success = outcome == "Success";
                report.result = outcome.to_string();
                report.circuit_state = Some(status.state);
                report.failure_count = Some(status.consecutive_failures);
            }
            SelfTestFeature::Retry => {
                let policy = (*self.retries.default_policy())
                    .clone()
                    .with_max_attempts(2)
                    .with_initial_delay(Duration::from_millis(10))
                    .with_max_delay(Some(Duration::from_millis(50)))
                    .with_jitter(0.0);
                let attempts = AtomicU32::new(0);
                let outcome = self
                    .retries
                    .execute_with_retry_async_policy(
                        SELF_TEST_KEY,
                        || {
                            attempts.fetch_add(1, Ordering::Relaxed);
                            async move {
                                if should_fail {
                                    Err("Simulated transient failure")
                                } else {
                                    Ok("Success")
                                }
                            }
                        },
                        &policy,
                    )
                    .await;
                report.attempts = Some(attempts.load(Ordering::Relaxed));
                match outcome {
                    Ok(value) => {
                        report.success = true;
                        report.result = value.to_string();
                    }
                    Err(e) => report.result = e.to_string(),
                }
            }
            SelfTestFeature::ErrorHandling => {
                if should_fail {
                    self.errors.handle_error(
                        SELF_TEST_KEY,
                        "error-handling",
                        "Simulated error for testing",
                        Some(json!({ "selfTest": true })),
                    );
                    report.error_generated = true;
                    report.result = "Error recorded".to_string();
                } else {
                    report.result = "No error generated".to_string();
                }
                report.success = true;
            }
        }

        tracing::info!(
            feature = feature.as_str(),
            should_fail,
            success = report.success,
            "Self-test completed"
        );
        Ok(report)
    }
}

fn count_in(statuses: &BTreeMap<String, CircuitBreakerStatus>, state: CircuitState) -> usize {
    statuses.values().filter(|s| s.state == state).count()
}
