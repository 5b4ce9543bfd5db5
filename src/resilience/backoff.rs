//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)` capped
/// at `max`, plus up to 10% jitter. Attempt 0 retries immediately.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let Some(exponent) = attempt.checked_sub(1) else {
        return Duration::ZERO;
    };
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    let capped = base.saturating_mul(factor).min(max);

    let jitter_ms = (capped.as_millis() / 10) as u64;
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };
    capped + Duration::from_millis(jitter)
}

/// Backoff for schedules stored as timestamps.
pub fn backoff_secs(attempt: u32, base_secs: u64, max_secs: u64) -> chrono::Duration {
    let delay = backoff_delay(
        attempt,
        Duration::from_secs(base_secs),
        Duration::from_secs(max_secs),
    );
    chrono::Duration::from_std(delay)
        .unwrap_or_else(|_| chrono::Duration::seconds(max_secs.min(i64::MAX as u64) as i64))
}
