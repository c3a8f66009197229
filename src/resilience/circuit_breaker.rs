//! Per-key circuit breaker registry.
//!
//! # Responsibilities
//! - Own one breaker record per service key, created lazily
//! - Wrap calls: fast-fail while open, admit a single probe after the open timeout
//! - Report terminal failures to the error statistics collector
//! - Expose consistent status snapshots and an administrative reset
//!
//! # Data Flow
//! ```text
//! execute(key, operation, fallback)
//!     → record(key)            (dashmap entry, concurrent creators converge)
//!     → admit()                (one snapshot load; CAS to claim the probe)
//!         Reject → fallback()
//!         Call / Probe → operation()
//!             Ok  → settle_success (CAS, generation-checked) → value
//!             Err → settle_failure (CAS, generation-checked) → report → fallback()
//! ```
//!
//! # Design Decisions
//! - Threshold and timeout are fixed when a record is created; `reset` applies current settings
//! - The probe slot is held by a drop guard so a panicking probe re-arms the breaker
//! - Never sleeps or blocks; the async variants only await the caller's futures

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, Guard};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;

use super::errors::ErrorStatistics;
use super::state::{Admission, BreakerSnapshot, CircuitState, OpenedAt};
use super::epoch_millis;
use crate::observability::metrics as telemetry;

/// Component name under which breaker failures are recorded.
pub const CIRCUIT_BREAKER_COMPONENT: &str = "CircuitBreaker";

/// Threshold and timeout applied to a breaker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Time spent open before a probe is admitted.
    pub open_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub service_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Epoch milliseconds.
    pub opened_at: Option<u64>,
    pub half_open_probe_in_flight: bool,
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub last_failure_at: Option<u64>,
    pub last_state_change: Option<u64>,
}

#[derive(Debug, Default)]
struct CallCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    // 0 = never
    last_failure_ms: AtomicU64,
    last_state_change_ms: AtomicU64,
}

/// State of a single service key.
#[derive(Debug)]
struct BreakerRecord {
    key: String,
    settings: BreakerSettings,
    snapshot: ArcSwap<BreakerSnapshot>,
    counters: CallCounters,
    errors: Option<Arc<ErrorStatistics>>,
}

/// Recorded when a half-open trial call never reports an outcome.
#[derive(Debug, thiserror::Error)]
#[error("trial call abandoned before completing")]
struct TrialCallAbandoned;

/// Permission to invoke the operation, tied to the generation it was granted in.
///
/// Dropping an unsettled probe permit re-arms the breaker as open and records the
/// failure like any other.
struct CallPermit {
    record: Arc<BreakerRecord>,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl CallPermit {
    fn succeed(mut self) {
        self.settled = true;
        self.record.settle_success(self.generation);
    }

    fn fail(mut self) -> BreakerSnapshot {
        self.settled = true;
        self.record.settle_failure(self.generation)
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            tracing::warn!(key = %self.record.key, "Probe abandoned, re-opening circuit");
            let after = self.record.settle_failure(self.generation);
            self.record.report_failure(&TrialCallAbandoned, &after);
        }
    }
}

impl BreakerRecord {
    fn new(
        key: &str,
        settings: BreakerSettings,
        errors: Option<Arc<ErrorStatistics>>,
    ) -> Self {
        telemetry::record_breaker_state(key, CircuitState::Closed);
        Self {
            key: key.to_string(),
            settings,
            snapshot: ArcSwap::from_pointee(BreakerSnapshot::closed(0)),
            counters: CallCounters::default(),
            errors,
        }
    }

    /// Record an operation failure under `CircuitBreaker:{key}`.
    fn report_failure<E>(&self, error: &E, after: &BreakerSnapshot)
    where
        E: fmt::Display + ?Sized,
    {
        let Some(errors) = &self.errors else {
            return;
        };
        let context = json!({
            "state": after.state,
            "consecutiveFailures": after.consecutive_failures,
        });
        errors.handle_error(CIRCUIT_BREAKER_COMPONENT, &self.key, error, Some(context));
    }

    /// CAS loop. `f` returning `None` leaves the snapshot untouched.
    fn update<F>(&self, mut f: F) -> Option<Arc<BreakerSnapshot>>
    where
        F: FnMut(&BreakerSnapshot) -> Option<BreakerSnapshot>,
    {
        let mut current = self.snapshot.load_full();
        loop {
            let next = Arc::new(f(current.as_ref())?);
            let previous = self.snapshot.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                return Some(next);
            }
            current = Guard::into_inner(previous);
        }
    }

    fn admit(self: &Arc<Self>) -> Option<CallPermit> {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        let mut decision = Admission::Reject;
        let mut observed = 0;
        let claimed = self.update(|s| {
            decision = s.admit(self.settings.open_timeout, Instant::now());
            observed = s.generation;
            (decision == Admission::Probe).then(|| s.claim_probe())
        });

        if let Some(probing) = claimed {
            self.note_transition(CircuitState::HalfOpen);
            tracing::info!(key = %self.key, "Circuit half-open, admitting probe");
            return Some(CallPermit {
                record: Arc::clone(self),
                generation: probing.generation,
                probe: true,
                settled: false,
            });
        }

        match decision {
            Admission::Call => Some(CallPermit {
                record: Arc::clone(self),
                generation: observed,
                probe: false,
                settled: false,
            }),
            _ => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                telemetry::record_breaker_call(&self.key, "rejected");
                tracing::debug!(key = %self.key, "Circuit open, taking fallback");
                None
            }
        }
    }

    fn settle_success(&self, generation: u64) {
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        telemetry::record_breaker_call(&self.key, "success");

        let changed = self.update(|s| {
            if s.generation != generation {
                return None;
            }
            s.on_success()
        });

        if let Some(next) = changed {
            if next.generation != generation {
                self.note_transition(CircuitState::Closed);
                tracing::info!(key = %self.key, "Probe succeeded, circuit closed");
            }
        }
    }

    /// Returns the snapshot in effect after the failure was applied.
    fn settle_failure(&self, generation: u64) -> BreakerSnapshot {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.counters
            .last_failure_ms
            .store(epoch_millis(), Ordering::Relaxed);
        telemetry::record_breaker_call(&self.key, "failure");

        let threshold = self.settings.failure_threshold;
        let mut from = CircuitState::Closed;
        let changed = self.update(|s| {
            if s.generation != generation {
                return None;
            }
            from = s.state;
            s.on_failure(threshold, OpenedAt::now())
        });

        match changed {
            Some(next) => {
                if next.generation != generation {
                    self.note_transition(CircuitState::Open);
                    if from == CircuitState::HalfOpen {
                        tracing::warn!(key = %self.key, "Probe failed, circuit re-opened");
                    } else {
                        tracing::warn!(
                            key = %self.key,
                            failures = next.consecutive_failures,
                            threshold,
                            "Circuit opened"
                        );
                    }
                }
                (*next).clone()
            }
            None => {
                tracing::debug!(key = %self.key, generation, "Discarding stale outcome");
                (*self.snapshot.load_full()).clone()
            }
        }
    }

    fn note_transition(&self, to: CircuitState) {
        self.counters
            .last_state_change_ms
            .store(epoch_millis(), Ordering::Relaxed);
        telemetry::record_breaker_transition(&self.key, to);
    }

    fn status(&self) -> CircuitBreakerStatus {
        let snapshot = self.snapshot.load_full();
        let c = &self.counters;
        let nonzero = |v: u64| (v != 0).then_some(v);
        CircuitBreakerStatus {
            service_name: self.key.clone(),
            state: snapshot.state,
            consecutive_failures: snapshot.consecutive_failures,
            opened_at: snapshot.opened_at.map(|at| at.epoch_millis()),
            half_open_probe_in_flight: snapshot.probe_in_flight,
            failure_threshold: self.settings.failure_threshold,
            open_timeout_ms: self.settings.open_timeout.as_millis() as u64,
            total_calls: c.calls.load(Ordering::Relaxed),
            total_successes: c.successes.load(Ordering::Relaxed),
            total_failures: c.failures.load(Ordering::Relaxed),
            rejected_calls: c.rejected.load(Ordering::Relaxed),
            last_failure_at: nonzero(c.last_failure_ms.load(Ordering::Relaxed)),
            last_state_change: nonzero(c.last_state_change_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Process-wide registry of circuit breakers, one per service key.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<BreakerRecord>>,
    defaults: ArcSwap<BreakerSettings>,
    overrides: DashMap<String, BreakerSettings>,
    errors: Option<Arc<ErrorStatistics>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults: ArcSwap::from_pointee(defaults),
            overrides: DashMap::new(),
            errors: None,
        }
    }

    /// Report operation failures to `errors` under `CircuitBreaker:{key}`.
    #[must_use]
    pub fn with_error_statistics(mut self, errors: Arc<ErrorStatistics>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Settings a record for `key` would be created with right now.
    pub fn settings_for(&self, key: &str) -> BreakerSettings {
        self.overrides
            .get(key)
            .map(|o| *o.value())
            .unwrap_or_else(|| **self.defaults.load())
    }

    pub fn default_settings(&self) -> BreakerSettings {
        **self.defaults.load()
    }

    /// Swap the defaults; only records created afterwards see them.
    pub fn update_defaults(&self, settings: BreakerSettings) {
        self.defaults.store(Arc::new(settings));
        tracing::info!(
            failure_threshold = settings.failure_threshold,
            open_timeout_ms = settings.open_timeout.as_millis() as u64,
            "Circuit breaker defaults updated"
        );
    }

    /// Per-key settings, applied when the record is next (re)created.
    pub fn set_override(&self, key: &str, settings: BreakerSettings) {
        self.overrides.insert(key.to_string(), settings);
    }

    /// Replace every override at once.
    pub fn replace_overrides(
        &self,
        overrides: impl IntoIterator<Item = (String, BreakerSettings)>,
    ) {
        self.overrides.clear();
        for (key, settings) in overrides {
            self.overrides.insert(key, settings);
        }
    }

    pub fn overrides(&self) -> BTreeMap<String, BreakerSettings> {
        self.overrides
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn record(&self, key: &str) -> Arc<BreakerRecord> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(key, "Creating circuit breaker");
                self.new_record(key)
            })
            .value()
            .clone()
    }

    /// Run `operation` behind the breaker for `key`.
    ///
    /// Failures of `operation` never reach the caller; `fallback()` is returned instead,
    /// both when the call fails and when the breaker rejects it. A panicking fallback
    /// unwinds to the caller.
    pub fn execute<T, E, F, G>(&self, key: &str, operation: F, fallback: G) -> T
    where
        F: FnOnce() -> Result<T, E>,
        G: FnOnce() -> T,
        E: fmt::Display,
    {
        match self.try_execute(key, operation, || Ok::<T, Infallible>(fallback())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`execute`](Self::execute) with a fallible fallback whose error is returned as-is.
    pub fn try_execute<T, E, F, G, FE>(&self, key: &str, operation: F, fallback: G) -> Result<T, FE>
    where
        F: FnOnce() -> Result<T, E>,
        G: FnOnce() -> Result<T, FE>,
        E: fmt::Display,
    {
        let record = self.record(key);
        let Some(permit) = record.admit() else {
            return fallback();
        };

        match operation() {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                let after = permit.fail();
                record.report_failure(&err, &after);
                fallback()
            }
        }
    }

    pub async fn execute_async<T, E, F, Fut, G, GFut>(
        &self,
        key: &str,
        operation: F,
        fallback: G,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
        E: fmt::Display,
    {
        let result = self
            .try_execute_async(key, operation, move || async move {
                Ok::<T, Infallible>(fallback().await)
            })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub async fn try_execute_async<T, E, F, Fut, G, GFut, FE>(
        &self,
        key: &str,
        operation: F,
        fallback: G,
    ) -> Result<T, FE>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, FE>>,
        E: fmt::Display,
    {
        let record = self.record(key);
        let Some(permit) = record.admit() else {
            return fallback().await;
        };

        // a cancelled probe future drops the permit and re-arms the breaker
        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                let after = permit.fail();
                record.report_failure(&err, &after);
                fallback().await
            }
        }
    }

    fn new_record(&self, key: &str) -> Arc<BreakerRecord> {
        Arc::new(BreakerRecord::new(
            key,
            self.settings_for(key),
            self.errors.clone(),
        ))
    }

    /// Status of `key`; unknown keys report a fresh closed breaker without creating one.
    pub fn get_status(&self, key: &str) -> CircuitBreakerStatus {
        match self.breakers.get(key) {
            Some(record) => record.status(),
            None => {
                let settings = self.settings_for(key);
                CircuitBreakerStatus {
                    service_name: key.to_string(),
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    half_open_probe_in_flight: false,
                    failure_threshold: settings.failure_threshold,
                    open_timeout_ms: settings.open_timeout.as_millis() as u64,
                    total_calls: 0,
                    total_successes: 0,
                    total_failures: 0,
                    rejected_calls: 0,
                    last_failure_at: None,
                    last_state_change: None,
                }
            }
        }
    }

    pub fn get_all_statuses(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Force `key` closed with a fresh record built from the current settings.
    pub fn reset(&self, key: &str) {
        let record = self.new_record(key);
        self.breakers.insert(key.to_string(), record);
        tracing::info!(key, "Circuit breaker reset");
    }

    /// Number of breakers in each state: (closed, open, half_open).
    pub fn state_counts(&self) -> (usize, usize, usize) {
        self.breakers
            .iter()
            .fold((0, 0, 0), |(c, o, h), entry| match entry.snapshot.load().state {
                CircuitState::Closed => (c + 1, o, h),
                CircuitState::Open => (c, o + 1, h),
                CircuitState::HalfOpen => (c, o, h + 1),
            })
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
