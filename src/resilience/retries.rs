//! Retry execution.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times (total tries, not retries)
//! - Wait a backoff delay between attempts, blocking or timer-scheduled
//! - Surface the last failure once tolerance is exhausted
//! - Stop early when the policy's predicate marks a failure as non-retryable
//!
//! # Design Decisions
//! - The sync path sleeps the calling thread; the async path never does
//! - Independent of the circuit breaker; callers compose the two
//! - Jitter defaults to zero so delays are exactly the formula value

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;

use super::backoff::{apply_jitter, calculate_backoff};
use super::errors::ErrorCategory;
use crate::observability::metrics as telemetry;

type RetryPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// How many times to try and how long to wait in between.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total tries, at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// At least 1.0; 1.0 means a fixed delay.
    pub backoff_multiplier: f64,
    /// `None` is unbounded.
    pub max_delay: Option<Duration>,
    /// In `[0, 1]`.
    pub jitter_factor: f64,
    retry_if: Option<RetryPredicate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 1.0,
            max_delay: None,
            jitter_factor: 0.0,
            retry_if: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Only retry failures whose message satisfies `predicate`.
    #[must_use]
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Only retry timeouts, network failures and throttling.
    #[must_use]
    pub fn transient_only(self) -> Self {
        self.retry_if(|message| ErrorCategory::classify(message).is_transient())
    }

    pub fn is_retryable(&self, message: &str) -> bool {
        self.retry_if.as_ref().map_or(true, |p| p(message))
    }

    /// Formula delay after failed attempt `attempt`, jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = calculate_backoff(
            attempt,
            self.initial_delay,
            self.backoff_multiplier,
            self.max_delay,
        );
        apply_jitter(base, self.jitter_factor)
    }
}

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; carries the last failure.
    Exhausted { label: String, attempts: u32, source: E },
    /// The policy's predicate refused to retry this failure.
    NonRetryable { label: String, attempt: u32, source: E },
}

impl<E> RetryError<E> {
    pub fn label(&self) -> &str {
        match self {
            RetryError::Exhausted { label, .. } | RetryError::NonRetryable { label, .. } => label,
        }
    }

    /// Number of invocations made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. }
            | RetryError::NonRetryable { source, .. } => source,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { source, .. }
            | RetryError::NonRetryable { source, .. } => source,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { label, attempts, source } => {
                write!(f, "operation '{}' failed after {} attempts: {}", label, attempts, source)
            }
            RetryError::NonRetryable { label, attempt, source } => {
                write!(
                    f,
                    "operation '{}' failed with a non-retryable error on attempt {}: {}",
                    label, attempt, source
                )
            }
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last_error())
    }
}

/// Lifetime counters of a [`RetryExecutor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    pub operations: u64,
    pub attempts: u64,
    /// Delays taken between attempts.
    pub retries: u64,
    pub successes: u64,
    pub exhausted: u64,
    /// Stopped early by the retry predicate.
    pub aborted: u64,
}

#[derive(Debug, Default)]
struct RetryCounters {
    operations: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    exhausted: AtomicU64,
    aborted: AtomicU64,
}

enum NextStep {
    Wait(Duration),
    Exhausted,
    NonRetryable,
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryExecutor {
    default_policy: ArcSwap<RetryPolicy>,
    counters: RetryCounters,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(default_policy: RetryPolicy) -> Self {
        Self {
            default_policy: ArcSwap::from_pointee(default_policy),
            counters: RetryCounters::default(),
        }
    }

    pub fn default_policy(&self) -> Arc<RetryPolicy> {
        self.default_policy.load_full()
    }

    /// Replace the policy used by calls that do not pass one.
    pub fn set_default_policy(&self, policy: RetryPolicy) {
        tracing::info!(?policy, "Default retry policy updated");
        self.default_policy.store(Arc::new(policy));
    }

    /// Blocking retry loop; sleeps the calling thread between attempts.
    pub fn execute_with_retry<T, E, F>(
        &self,
        label: &str,
        mut operation: F,
        policy: &RetryPolicy,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        self.counters.operations.fetch_add(1, Ordering::Relaxed);
        let mut attempt = 1;
        loop {
            self.note_attempt(label);
            match operation() {
                Ok(value) => return Ok(self.succeeded(label, attempt, value)),
                Err(err) => match self.next_step(label, attempt, policy, &err) {
                    NextStep::Wait(delay) => std::thread::sleep(delay),
                    NextStep::Exhausted => return Err(exhausted(label, attempt, err)),
                    NextStep::NonRetryable => return Err(non_retryable(label, attempt, err)),
                },
            }
            attempt += 1;
        }
    }

    /// Blocking retry that returns `fallback()` instead of an error.
    pub fn execute_with_retry_and_fallback<T, E, F, G>(
        &self,
        label: &str,
        operation: F,
        fallback: G,
        policy: &RetryPolicy,
    ) -> T
    where
        F: FnMut() -> Result<T, E>,
        G: FnOnce() -> T,
        E: fmt::Display,
    {
        match self.execute_with_retry(label, operation, policy) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(label, error = %err, "Retries failed, using fallback");
                fallback()
            }
        }
    }

    /// Async retry under the executor's default policy.
    pub async fn execute_with_retry_async<T, E, F, Fut>(
        &self,
        label: &str,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let policy = self.default_policy();
        self.execute_with_retry_async_policy(label, operation, &policy)
            .await
    }

    /// Async retry; delays are timer futures, no thread is blocked.
    pub async fn execute_with_retry_async_policy<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        policy: &RetryPolicy,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.counters.operations.fetch_add(1, Ordering::Relaxed);
        let mut attempt = 1;
        loop {
            self.note_attempt(label);
            match operation().await {
                Ok(value) => return Ok(self.succeeded(label, attempt, value)),
                Err(err) => match self.next_step(label, attempt, policy, &err) {
                    NextStep::Wait(delay) => tokio::time::sleep(delay).await,
                    NextStep::Exhausted => return Err(exhausted(label, attempt, err)),
                    NextStep::NonRetryable => return Err(non_retryable(label, attempt, err)),
                },
            }
            attempt += 1;
        }
    }

    pub fn stats(&self) -> RetryStats {
        let c = &self.counters;
        RetryStats {
            operations: c.operations.load(Ordering::Relaxed),
            attempts: c.attempts.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
        }
    }

    fn note_attempt(&self, label: &str) {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        telemetry::record_retry_attempt(label);
    }

    fn succeeded<T>(&self, label: &str, attempt: u32, value: T) -> T {
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            tracing::info!(label, attempt, "Operation succeeded after retry");
        }
        value
    }

    fn next_step<E: fmt::Display>(
        &self,
        label: &str,
        attempt: u32,
        policy: &RetryPolicy,
        error: &E,
    ) -> NextStep {
        let message = error.to_string();

        if attempt >= policy.max_attempts {
            self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
            telemetry::record_retry_exhausted(label);
            tracing::error!(label, attempts = attempt, error = %message, "Retries exhausted");
            return NextStep::Exhausted;
        }

        if !policy.is_retryable(&message) {
            self.counters.aborted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(label, attempt, error = %message, "Non-retryable failure");
            return NextStep::NonRetryable;
        }

        let delay = policy.delay_for(attempt);
        self.counters.retries.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "Attempt failed, retrying"
        );
        NextStep::Wait(delay)
    }
}

fn exhausted<E>(label: &str, attempts: u32, source: E) -> RetryError<E> {
    RetryError::Exhausted {
        label: label.to_string(),
        attempts,
        source,
    }
}

fn non_retryable<E>(label: &str, attempt: u32, source: E) -> RetryError<E> {
    RetryError::NonRetryable {
        label: label.to_string(),
        attempt,
        source,
    }
}
