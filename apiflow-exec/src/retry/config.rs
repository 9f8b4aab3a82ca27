use std::time::Duration;

use apiflow_core::types::deserialize_duration;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay between attempts for steps that declare no `retry_delay`.
    #[serde(deserialize_with = "deserialize_duration")]
    pub default_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_factor: f64,
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_delay: Duration,
    /// Full jitter: sleep a random duration in `0..=delay`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(1000),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}
