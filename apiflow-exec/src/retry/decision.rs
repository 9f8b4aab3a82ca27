use std::time::Duration;

use crate::retry::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    AttemptsExhausted,
    Substitution,
    Transport,
    Validation,
}

/// Decide if a failed attempt is retried and how long to wait first.
///
/// - `attempt_no`: 1-based number of the attempt that just failed.
/// - `max_attempts`: total attempts allowed for the step.
/// - `step_delay`: the step's own `retry_delay`, if any.
/// - `rand_u64`: RNG for full jitter.
pub fn decide_retry(
    cfg: &RetryConfig,
    attempt_no: u32,
    max_attempts: u32,
    step_delay: Option<Duration>,
    reason: RetryReason,
    rand_u64: impl Fn() -> u64,
) -> RetryDecision {
    if attempt_no >= max_attempts {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    let delay = backoff_delay(cfg, attempt_no, step_delay);
    let delay = if cfg.jitter && !delay.is_zero() {
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand_u64() % (ms + 1))
    } else {
        delay
    };
    RetryDecision::RetryAfter { delay, reason }
}

/// `base * factor^(attempt_no-1)`, capped at `max_delay`.
pub fn backoff_delay(cfg: &RetryConfig, attempt_no: u32, step_delay: Option<Duration>) -> Duration {
    let base = step_delay.unwrap_or(cfg.default_delay);
    let exp = attempt_no.saturating_sub(1) as i32;
    let raw = (base.as_millis() as f64) * cfg.backoff_factor.max(0.0).powi(exp);
    let capped = raw.min(cfg.max_delay.as_millis() as f64).max(0.0);
    Duration::from_millis(capped as u64)
}
