use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Backoff delay for a 1-indexed attempt, before jitter.
///
/// `backoff_ms * multiplier^(attempt - 1)`, capped at `max_backoff_ms`. The
/// exponent is applied only when the multiplier is greater than 1.
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let factor = if policy.backoff_multiplier > 1.0 {
        policy.backoff_multiplier.powi((attempt - 1) as i32)
    } else {
        1.0
    };
    let delay_ms = (policy.backoff_ms as f64 * factor).min(policy.max_backoff_ms as f64);
    Duration::from_millis(delay_ms as u64)
}

/// Backoff delay with up to 10% uniform jitter, floored to whole milliseconds
pub fn delay_with_jitter<R: Rng + ?Sized>(
    policy: &RetryPolicy,
    attempt: u32,
    rng: &mut R,
) -> Duration {
    let base_ms = base_delay(policy, attempt).as_millis() as f64;
    let jitter = rng.gen::<f64>() * 0.1 * base_ms;
    Duration::from_millis((base_ms + jitter).floor() as u64)
}

/// Production entry point using a non-seeded random source
pub fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    delay_with_jitter(policy, attempt, &mut rand::thread_rng())
}
