//! Circuit breaker state machine.
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: dependency assumed down, calls take the fallback
//! - Half-Open: exactly one probe call is in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive_failures >= threshold
//! Open → Half-Open:   open_timeout elapsed and the probe slot is claimed
//! Half-Open → Closed: probe succeeds (failures and opened_at cleared)
//! Half-Open → Open:   probe fails (fresh opened_at, failures capped at threshold)
//! ```
//!
//! # Design Decisions
//! - Transitions are pure functions over an immutable snapshot
//! - Every state change bumps `generation`; outcomes from older generations are stale
//! - `opened_at` survives Half-Open and is only cleared on close

use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use super::to_epoch_millis;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Gauge encoding: 0 = closed, 1 = half-open, 2 = open.
    pub fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moment the circuit opened, on both the monotonic and the wall clock.
///
/// The monotonic instant drives the timeout; the wall clock is what gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedAt {
    pub instant: Instant,
    pub wall: SystemTime,
}

impl OpenedAt {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    pub fn epoch_millis(&self) -> u64 {
        to_epoch_millis(self.wall)
    }
}

/// How a call should proceed given the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed: invoke the operation.
    Call,
    /// Open timeout elapsed and nobody holds the probe slot: try to claim it.
    Probe,
    /// Take the fallback without invoking the operation.
    Reject,
}

/// Immutable view of everything the transition rules read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<OpenedAt>,
    pub probe_in_flight: bool,
    pub generation: u64,
}

impl BreakerSnapshot {
    /// A fresh closed snapshot.
    pub fn closed(generation: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            generation,
        }
    }

    pub fn admit(&self, open_timeout: Duration, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Call,
            CircuitState::HalfOpen => Admission::Reject,
            CircuitState::Open => {
                if self.probe_in_flight {
                    return Admission::Reject;
                }
                let elapsed = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at.instant))
                    .unwrap_or(Duration::MAX);
                if elapsed < open_timeout {
                    Admission::Reject
                } else {
                    Admission::Probe
                }
            }
        }
    }

    /// Open → Half-Open with the probe slot held.
    pub fn claim_probe(&self) -> Self {
        Self {
            state: CircuitState::HalfOpen,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            probe_in_flight: true,
            generation: self.generation + 1,
        }
    }

    /// Next snapshot after a successful call, or `None` when nothing changes.
    pub fn on_success(&self) -> Option<Self> {
        match self.state {
            CircuitState::HalfOpen => Some(Self::closed(self.generation + 1)),
            CircuitState::Closed if self.consecutive_failures > 0 => Some(Self {
                consecutive_failures: 0,
                ..self.clone()
            }),
            _ => None,
        }
    }

    /// Next snapshot after a failed call, or `None` when nothing changes.
    pub fn on_failure(&self, threshold: u32, now: OpenedAt) -> Option<Self> {
        match self.state {
            CircuitState::HalfOpen => Some(Self {
                state: CircuitState::Open,
                // never pushed past the threshold, never decremented
                consecutive_failures: self
                    .consecutive_failures
                    .saturating_add(1)
                    .min(threshold)
                    .max(self.consecutive_failures),
                opened_at: Some(now),
                probe_in_flight: false,
                generation: self.generation + 1,
            }),
            CircuitState::Closed => {
                let failures = self.consecutive_failures.saturating_add(1);
                if failures >= threshold {
                    Some(Self {
                        state: CircuitState::Open,
                        consecutive_failures: failures,
                        opened_at: Some(now),
                        probe_in_flight: false,
                        generation: self.generation + 1,
                    })
                } else {
                    Some(Self {
                        consecutive_failures: failures,
                        ..self.clone()
                    })
                }
            }
            CircuitState::Open => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_at(instant: Instant, failures: u32) -> BreakerSnapshot {
        BreakerSnapshot {
            state: CircuitState::Open,
            consecutive_failures: failures,
            opened_at: Some(OpenedAt {
                instant,
                wall: SystemTime::now(),
            }),
            probe_in_flight: false,
            generation: 1,
        }
    }

    #[test]
    fn test_closed_trips_at_threshold() {
        let s0 = BreakerSnapshot::closed(0);
        let s1 = s0.on_failure(3, OpenedAt::now()).unwrap();
        let s2 = s1.on_failure(3, OpenedAt::now()).unwrap();
        assert_eq!(s2.state, CircuitState::Closed);
        assert_eq!(s2.consecutive_failures, 2);
        assert_eq!(s2.generation, 0);

        let s3 = s2.on_failure(3, OpenedAt::now()).unwrap();
        assert_eq!(s3.state, CircuitState::Open);
        assert_eq!(s3.consecutive_failures, 3);
        assert!(s3.opened_at.is_some());
        assert_eq!(s3.generation, 1);
    }

    #[test]
    fn test_success_resets_failures_in_closed() {
        let s = BreakerSnapshot::closed(4)
            .on_failure(5, OpenedAt::now())
            .unwrap();
        let next = s.on_success().unwrap();
        assert_eq!(next.consecutive_failures, 0);
        assert_eq!(next.generation, 4);
        assert!(BreakerSnapshot::closed(0).on_success().is_none());
    }

    #[test]
    fn test_open_rejects_until_timeout() {
        let start = Instant::now();
        let s = open_at(start, 3);
        let timeout = Duration::from_secs(10);
        assert_eq!(s.admit(timeout, start + Duration::from_secs(1)), Admission::Reject);
        assert_eq!(s.admit(timeout, start + Duration::from_secs(10)), Admission::Probe);
    }

    #[test]
    fn test_half_open_rejects_everyone() {
        let start = Instant::now();
        let probing = open_at(start, 3).claim_probe();
        assert_eq!(probing.state, CircuitState::HalfOpen);
        assert!(probing.probe_in_flight);
        assert_eq!(probing.opened_at.map(|o| o.instant), Some(start));
        assert_eq!(
            probing.admit(Duration::ZERO, start + Duration::from_secs(60)),
            Admission::Reject
        );
    }

    #[test]
    fn test_probe_success_closes() {
        let probing = open_at(Instant::now(), 3).claim_probe();
        let closed = probing.on_success().unwrap();
        assert_eq!(closed.state, CircuitState::Closed);
        assert_eq!(closed.consecutive_failures, 0);
        assert!(closed.opened_at.is_none());
        assert!(!closed.probe_in_flight);
        assert_eq!(closed.generation, probing.generation + 1);
    }

    #[test]
    fn test_probe_failure_reopens_without_exceeding_threshold() {
        let start = Instant::now();
        let probing = open_at(start, 3).claim_probe();
        let later = OpenedAt {
            instant: start + Duration::from_secs(30),
            wall: SystemTime::now(),
        };
        let reopened = probing.on_failure(3, later).unwrap();
        assert_eq!(reopened.state, CircuitState::Open);
        assert_eq!(reopened.consecutive_failures, 3);
        assert_eq!(reopened.opened_at.map(|o| o.instant), Some(later.instant));
        assert!(!reopened.probe_in_flight);
    }

    #[test]
    fn test_outcomes_ignored_while_open() {
        let s = open_at(Instant::now(), 3);
        assert!(s.on_success().is_none());
        assert!(s.on_failure(3, OpenedAt::now()).is_none());
    }

    #[test]
    fn test_state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
    }
}
