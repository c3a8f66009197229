//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller wraps a dependency call:
//!     → circuit_breaker.rs (admit, fast-fail or probe, record outcome)
//!         → state.rs (pure transition rules over one immutable snapshot)
//!         → errors.rs (terminal failures recorded as CircuitBreaker:{key})
//!     → retries.rs (optional, inside or outside the breaker)
//!         → backoff.rs (delay between attempts)
//!
//! Degraded result:
//!     → errors.rs (GracefulDegradation:{feature}, value returned unchanged)
//! ```
//!
//! # Design Decisions
//! - Per-key breaker records in a sharded map; no lock spans all keys
//! - Breaker state is one snapshot swapped with compare-and-swap
//! - Retry is independent of the breaker; callers compose them
//! - The error collector never affects control flow
//! - No operation timeout is enforced here; wrap the operation if one is needed

pub mod backoff;
pub mod circuit_breaker;
pub mod errors;
pub mod retries;
pub mod state;

pub use circuit_breaker::{BreakerSettings, CircuitBreakerRegistry, CircuitBreakerStatus};
pub use errors::{ErrorCategory, ErrorRecord, ErrorSeverity, ErrorStatistics};
pub use retries::{RetryError, RetryExecutor, RetryPolicy, RetryStats};
pub use state::CircuitState;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating at zero for clocks set before 1970.
pub fn epoch_millis() -> u64 {
    to_epoch_millis(SystemTime::now())
}

pub(crate) fn to_epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
