//! Backoff delay between retry attempts.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `initial * multiplier^(attempt - 1)`, capped at `max` when one is given.
/// Attempt 0 never waits.
pub fn calculate_backoff(
    attempt: u32,
    initial: Duration,
    multiplier: f64,
    max: Option<Duration>,
) -> Duration {
    if attempt == 0 || initial.is_zero() {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let factor = multiplier.max(1.0).powi(exponent);
    let delay_secs = initial.as_secs_f64() * factor;

    // An overflowing product is treated as unbounded and falls through to the cap.
    let delay = Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX);
    match max {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Scale `delay` by a random factor in `[1 - jitter, 1 + jitter]`, clamped at zero.
pub fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    if jitter == 0.0 || delay.is_zero() {
        return delay;
    }

    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    Duration::try_from_secs_f64((delay.as_secs_f64() * factor).max(0.0)).unwrap_or(delay)
}
