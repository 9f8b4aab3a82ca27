use std::collections::BTreeMap;
use std::time::Duration;

use apiflow_core::types::deserialize_duration;

use crate::retry::RetryConfig;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on in-flight requests across the whole run.
    pub max_parallel: usize,
    /// Optional per-protocol bounds, keyed by protocol name (`http`, `grpc`).
    pub per_protocol_concurrency: BTreeMap<String, usize>,
    /// Used when neither the step nor its request sets a timeout.
    #[serde(deserialize_with = "deserialize_duration")]
    pub default_timeout: Duration,
    pub max_response_bytes: usize,
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            per_protocol_concurrency: BTreeMap::new(),
            default_timeout: Duration::from_secs(30),
            max_response_bytes: 10 * 1024 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_yaml() {
        let cfg: ExecutorConfig = serde_yaml::from_str(
            "max_parallel: 4\ndefault_timeout: 5s\nper_protocol_concurrency:\n  http: 2\nretry:\n  backoff_factor: 2.0\n  default_delay: 100ms\n",
        )
        .unwrap();
        assert_eq!(cfg.max_parallel, 4);
        assert_eq!(cfg.default_timeout, Duration::from_secs(5));
        assert_eq!(cfg.per_protocol_concurrency["http"], 2);
        assert_eq!(cfg.retry.default_delay, Duration::from_millis(100));
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(60));
        assert_eq!(cfg.max_response_bytes, 10 * 1024 * 1024);
    }
}
