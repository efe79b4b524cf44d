//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Largest exponent applied to the base delay; anything above is capped anyway.
const MAX_EXPONENT: u32 = 62;

/// Calculates the delay before retrying after the given 0-based attempt.
///
/// `base * 2^attempt`, capped at `max`, then randomized by up to
/// `jitter_factor` of the capped value in either direction.
pub fn calculate_backoff(
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
) -> Duration {
    calculate_backoff_with_rng(
        attempt,
        base_delay,
        max_delay,
        jitter_factor,
        &mut rand::thread_rng(),
    )
}

/// Same as [`calculate_backoff`] with an explicit random source.
pub fn calculate_backoff_with_rng<R: Rng + ?Sized>(
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    rng: &mut R,
) -> Duration {
    let capped = capped_delay_ms(attempt, base_delay, max_delay);
    let jitter_factor = if jitter_factor.is_finite() {
        jitter_factor.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let jitter = if jitter_factor > 0.0 {
        capped * jitter_factor * rng.gen_range(-1.0..=1.0)
    } else {
        0.0
    };

    Duration::from_millis((capped + jitter).max(0.0).round() as u64)
}

/// The un-jittered delay in milliseconds: `min(base * 2^attempt, max)`.
pub(crate) fn capped_delay_ms(attempt: u32, base_delay: Duration, max_delay: Duration) -> f64 {
    let base_ms = base_delay.as_millis() as f64;
    let max_ms = max_delay.as_millis() as f64;
    let exponential = base_ms * 2f64.powi(attempt.min(MAX_EXPONENT) as i32);
    exponential.min(max_ms)
}
