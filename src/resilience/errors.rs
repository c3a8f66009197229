//! Error statistics and graceful degradation.
//!
//! # Responsibilities
//! - Record error occurrences keyed by `{component}:{operation}`
//! - Classify errors into a category and severity from their message
//! - Record degradations under `GracefulDegradation:{feature}` and hand back the degraded value
//! - Expose snapshots and support a full clear
//!
//! # Design Decisions
//! - Recording never fails and never changes the caller's control flow
//! - Create-and-increment happens under one shard lock (dashmap entry API)
//! - Severity picks the log level; every record bumps a counter

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::epoch_millis;
use crate::observability::metrics as telemetry;

const DEGRADATION_COMPONENT: &str = "GracefulDegradation";
const EXTERNAL_SERVICE_COMPONENT: &str = "ExternalService";

/// Occurrences above which a recently active key counts as a high error rate.
const HIGH_RATE_THRESHOLD: u64 = 10;
const HIGH_RATE_WINDOW: Duration = Duration::from_secs(300);

/// Coarse error classification derived from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Timeout,
    Network,
    RateLimit,
    Authentication,
    NotFound,
    Validation,
    Unknown,
}

impl ErrorCategory {
    /// Classify by keyword; the first matching rule wins.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needle: &str| message.contains(needle);

        if has("timeout") || has("timed out") {
            ErrorCategory::Timeout
        } else if has("connection") || has("network") {
            ErrorCategory::Network
        } else if has("throttl") || has("rate limit") {
            ErrorCategory::RateLimit
        } else if has("unauthorized") || has("forbidden") {
            ErrorCategory::Authentication
        } else if has("not found") || has("404") {
            ErrorCategory::NotFound
        } else if has("validation") || has("invalid") {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Unknown
        }
    }

    /// Whether a failure in this category is worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Network | ErrorCategory::RateLimit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<ErrorCategory> for ErrorSeverity {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Authentication | ErrorCategory::Validation => ErrorSeverity::Critical,
            ErrorCategory::Network | ErrorCategory::Timeout => ErrorSeverity::High,
            ErrorCategory::RateLimit | ErrorCategory::NotFound => ErrorSeverity::Medium,
            ErrorCategory::Unknown => ErrorSeverity::Low,
        }
    }
}

/// Aggregated occurrences for one statistics key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub key: String,
    pub occurrence_count: u64,
    pub last_message: String,
    /// Epoch milliseconds.
    pub first_timestamp: u64,
    /// Epoch milliseconds.
    pub last_timestamp: u64,
    pub sample_context: Option<Value>,
    pub error_types: BTreeMap<String, u64>,
    pub last_category: ErrorCategory,
    pub last_severity: ErrorSeverity,
}

impl ErrorRecord {
    fn new(key: &str, now: u64) -> Self {
        Self {
            key: key.to_string(),
            occurrence_count: 0,
            last_message: String::new(),
            first_timestamp: now,
            last_timestamp: now,
            sample_context: None,
            error_types: BTreeMap::new(),
            last_category: ErrorCategory::Unknown,
            last_severity: ErrorSeverity::Low,
        }
    }

    fn observe(&mut self, event: &ErrorEvent<'_>, now: u64) {
        self.occurrence_count += 1;
        self.last_message.clear();
        self.last_message.push_str(event.message);
        self.last_timestamp = now;
        self.sample_context = event.context.clone();
        *self.error_types.entry(event.type_name.to_string()).or_insert(0) += 1;
        self.last_category = event.category;
        self.last_severity = event.severity;
    }
}

struct ErrorEvent<'a> {
    message: &'a str,
    type_name: &'a str,
    context: Option<Value>,
    category: ErrorCategory,
    severity: ErrorSeverity,
}

/// Synthetic error recorded by [`ErrorStatistics::handle_service_timeout`].
#[derive(Debug, thiserror::Error)]
#[error("service {service} timed out after {timeout_ms}ms")]
pub struct ServiceTimeout {
    pub service: String,
    pub timeout_ms: u64,
}

/// Process-wide error statistics collector.
#[derive(Debug, Default)]
pub struct ErrorStatistics {
    records: DashMap<String, ErrorRecord>,
}

impl ErrorStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error under `{component}:{operation}`.
    pub fn handle_error<E>(
        &self,
        component: &str,
        operation: &str,
        error: &E,
        context: Option<Value>,
    ) where
        E: fmt::Display + ?Sized,
    {
        let key = format!("{component}:{operation}");
        let message = error.to_string();
        let category = ErrorCategory::classify(&message);
        let severity = ErrorSeverity::from(category);

        self.record(
            &key,
            ErrorEvent {
                message: &message,
                type_name: short_type_name::<E>(),
                context,
                category,
                severity,
            },
        );
        telemetry::record_error(component, operation);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => tracing::error!(
                component,
                operation,
                category = ?category,
                severity = ?severity,
                error = %message,
                "Error recorded"
            ),
            ErrorSeverity::Medium => tracing::warn!(
                component,
                operation,
                category = ?category,
                error = %message,
                "Error recorded"
            ),
            ErrorSeverity::Low => tracing::info!(
                component,
                operation,
                error = %message,
                "Error recorded"
            ),
        }
    }

    /// Record a degradation of `feature` and return `degraded_value` unchanged.
    pub fn handle_graceful_degradation<T, E>(
        &self,
        feature: &str,
        error: &E,
        degraded_value: T,
        reason: &str,
    ) -> T
    where
        E: fmt::Display + ?Sized,
    {
        let key = format!("{DEGRADATION_COMPONENT}:{feature}");
        let cause = error.to_string();
        let category = ErrorCategory::classify(&cause);

        self.record(
            &key,
            ErrorEvent {
                message: reason,
                type_name: short_type_name::<E>(),
                context: Some(json!({ "reason": reason, "error": cause })),
                category,
                severity: ErrorSeverity::from(category),
            },
        );
        telemetry::record_degradation(feature);
        tracing::warn!(feature, reason, error = %cause, "Graceful degradation applied");

        degraded_value
    }

    /// Record that `service` exceeded `timeout`.
    pub fn handle_service_timeout(&self, service: &str, timeout: Duration) {
        let error = ServiceTimeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
        let context = json!({ "service": service, "timeoutMs": error.timeout_ms });
        self.handle_error(EXTERNAL_SERVICE_COMPONENT, service, &error, Some(context));
    }

    fn record(&self, key: &str, event: ErrorEvent<'_>) {
        let now = epoch_millis();
        // entry() holds the shard write lock across create-and-increment
        self.records
            .entry(key.to_string())
            .or_insert_with(|| ErrorRecord::new(key, now))
            .observe(&event, now);
    }

    /// Snapshot of every record.
    pub fn get_error_statistics(&self) -> HashMap<String, ErrorRecord> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<ErrorRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn clear_error_statistics(&self) {
        let cleared = self.records.len();
        self.records.clear();
        tracing::info!(cleared, "Error statistics cleared");
    }

    /// Number of distinct keys.
    pub fn error_type_count(&self) -> usize {
        self.records.len()
    }

    /// Sum of occurrences over all keys.
    pub fn total_error_count(&self) -> u64 {
        self.records.iter().map(|r| r.occurrence_count).sum()
    }

    /// More than 10 occurrences with the latest inside the last five minutes.
    pub fn is_error_rate_high(&self, key: &str) -> bool {
        let Some(record) = self.records.get(key) else {
            return false;
        };
        let window_start = epoch_millis().saturating_sub(HIGH_RATE_WINDOW.as_millis() as u64);
        record.occurrence_count > HIGH_RATE_THRESHOLD && record.last_timestamp >= window_start
    }
}

/// Last path segment of the type name, generics stripped.
fn short_type_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct DbError(String);

    #[test]
    fn test_handle_error_creates_and_merges_record() {
        let stats = ErrorStatistics::new();
        stats.handle_error("Db", "save", &DbError("connection refused".into()), None);
        stats.handle_error(
            "Db",
            "save",
            &DbError("invalid row".into()),
            Some(json!({ "table": "events" })),
        );

        let record = stats.get("Db:save").unwrap();
        assert_eq!(record.occurrence_count, 2);
        assert_eq!(record.last_message, "invalid row");
        assert_eq!(record.sample_context, Some(json!({ "table": "events" })));
        assert_eq!(record.error_types.get("DbError"), Some(&2));
        assert_eq!(record.last_category, ErrorCategory::Validation);
        assert_eq!(record.last_severity, ErrorSeverity::Critical);
        assert!(record.first_timestamp <= record.last_timestamp);
    }

    #[test]
    fn test_statistics_isolation() {
        let stats = ErrorStatistics::new();
        stats.handle_error("A", "op", "boom", None);
        stats.handle_error("B", "op", "boom", None);
        stats.handle_error("B", "op", "boom", None);

        assert_eq!(stats.get("A:op").unwrap().occurrence_count, 1);
        assert_eq!(stats.get("B:op").unwrap().occurrence_count, 2);
        assert_eq!(stats.error_type_count(), 2);
        assert_eq!(stats.total_error_count(), 3);
    }

    #[test]
    fn test_degradation_returns_value_unchanged() {
        let stats = ErrorStatistics::new();
        let value = vec![1, 2, 3];
        let out = stats.handle_graceful_degradation(
            "recommendations",
            "model unavailable",
            value.clone(),
            "serving cached results",
        );
        assert_eq!(out, value);

        let record = stats.get("GracefulDegradation:recommendations").unwrap();
        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.last_message, "serving cached results");
    }

    #[test]
    fn test_service_timeout_is_classified_as_timeout() {
        let stats = ErrorStatistics::new();
        stats.handle_service_timeout("geo", Duration::from_millis(1500));

        let record = stats.get("ExternalService:geo").unwrap();
        assert_eq!(record.last_category, ErrorCategory::Timeout);
        assert_eq!(record.last_severity, ErrorSeverity::High);
        assert_eq!(record.error_types.get("ServiceTimeout"), Some(&1));
        assert_eq!(record.sample_context.unwrap()["timeoutMs"], 1500);
    }

    #[test]
    fn test_clear_removes_everything() {
        let stats = ErrorStatistics::new();
        stats.handle_error("A", "op", "x", None);
        stats.clear_error_statistics();
        assert!(stats.get_error_statistics().is_empty());
        assert_eq!(stats.total_error_count(), 0);
    }

    #[test]
    fn test_error_rate_high_after_eleven_occurrences() {
        let stats = ErrorStatistics::new();
        for _ in 0..10 {
            stats.handle_error("Api", "call", "rate limit exceeded", None);
        }
        assert!(!stats.is_error_rate_high("Api:call"));
        stats.handle_error("Api", "call", "rate limit exceeded", None);
        assert!(stats.is_error_rate_high("Api:call"));
        assert!(!stats.is_error_rate_high("Api:missing"));
    }

    #[test]
    fn test_category_classification() {
        assert_eq!(ErrorCategory::classify("Request timed out"), ErrorCategory::Timeout);
        assert_eq!(ErrorCategory::classify("Network unreachable"), ErrorCategory::Network);
        assert_eq!(ErrorCategory::classify("Throttling"), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::classify("403 Forbidden"), ErrorCategory::Authentication);
        assert_eq!(ErrorCategory::classify("HTTP 404"), ErrorCategory::NotFound);
        assert_eq!(ErrorCategory::classify("something odd"), ErrorCategory::Unknown);
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(!ErrorCategory::Validation.is_transient());
    }

    #[test]
    fn test_concurrent_increments_on_one_key() {
        let stats = Arc::new(ErrorStatistics::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..5 {
                        stats.handle_error("Svc", "op", "boom", None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.get("Svc:op").unwrap().occurrence_count, 50);
    }
}
