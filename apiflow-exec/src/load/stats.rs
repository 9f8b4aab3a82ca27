use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use crate::load::spec::Thresholds;

/// Error rate, in percent, above which a stress step is the breaking point.
pub const BREAKING_ERROR_RATE: f64 = 10.0;

const TOP_ERRORS: usize = 5;

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub(crate) struct Sample {
    pub latency: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCount {
    pub message: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestResult {
    pub name: String,
    pub concurrency: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub avg_latency: Duration,
    pub p50_latency: Duration,
    pub p95_latency: Duration,
    pub p99_latency: Duration,
    pub requests_per_second: f64,
    /// Percentage of failed dispatches, 0 to 100.
    pub error_rate: f64,
    pub elapsed: Duration,
    /// Most frequent error messages, most frequent first.
    pub top_errors: Vec<ErrorCount>,
    pub threshold_violations: Vec<String>,
    pub passed: bool,
}

impl LoadTestResult {
    pub(crate) fn from_samples(name: &str, concurrency: usize, samples: &[Sample], elapsed: Duration) -> Self {
        let total = samples.len() as u64;
        let failed = samples.iter().filter(|s| s.error.is_some()).count() as u64;

        let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();
        let sum: Duration = latencies.iter().sum();
        let avg = if latencies.is_empty() {
            Duration::ZERO
        } else {
            sum / latencies.len() as u32
        };

        let secs = elapsed.as_secs_f64();
        Self {
            name: name.to_string(),
            concurrency,
            total_requests: total,
            successful_requests: total - failed,
            failed_requests: failed,
            min_latency: latencies.first().copied().unwrap_or_default(),
            max_latency: latencies.last().copied().unwrap_or_default(),
            avg_latency: avg,
            p50_latency: percentile(&latencies, 50.0),
            p95_latency: percentile(&latencies, 95.0),
            p99_latency: percentile(&latencies, 99.0),
            requests_per_second: if secs > 0.0 { total as f64 / secs } else { 0.0 },
            error_rate: if total > 0 {
                failed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            elapsed,
            top_errors: top_errors(samples),
            threshold_violations: Vec::new(),
            passed: true,
        }
    }

    pub(crate) fn apply_thresholds(&mut self, thresholds: &Thresholds) {
        let mut violations = Vec::new();
        if let Some(limit) = thresholds.max_latency.map(|d| d.as_duration()) {
            if self.max_latency > limit {
                violations.push(format!("max latency {:?} exceeds {:?}", self.max_latency, limit));
            }
        }
        if let Some(limit) = thresholds.max_p95_latency.map(|d| d.as_duration()) {
            if self.p95_latency > limit {
                violations.push(format!("p95 latency {:?} exceeds {:?}", self.p95_latency, limit));
            }
        }
        if let Some(min) = thresholds.min_rps {
            if self.requests_per_second < min {
                violations.push(format!(
                    "throughput {:.2} rps is below {min:.2}",
                    self.requests_per_second
                ));
            }
        }
        if let Some(max) = thresholds.max_error_rate {
            if self.error_rate > max {
                violations.push(format!("error rate {:.2}% exceeds {max:.2}%", self.error_rate));
            }
        }
        self.passed = violations.is_empty();
        self.threshold_violations = violations;
    }

    pub fn is_breaking(&self) -> bool {
        self.error_rate > BREAKING_ERROR_RATE
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "concurrency": self.concurrency,
            "total_requests": self.total_requests,
            "successful_requests": self.successful_requests,
            "failed_requests": self.failed_requests,
            "latency_ms": {
                "min": self.min_latency.as_millis() as u64,
                "max": self.max_latency.as_millis() as u64,
                "avg": self.avg_latency.as_millis() as u64,
                "p50": self.p50_latency.as_millis() as u64,
                "p95": self.p95_latency.as_millis() as u64,
                "p99": self.p99_latency.as_millis() as u64,
            },
            "requests_per_second": self.requests_per_second,
            "error_rate": self.error_rate,
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "top_errors": self.top_errors.iter().map(|e| json!({"message": e.message, "count": e.count})).collect::<Vec<_>>(),
            "threshold_violations": self.threshold_violations,
            "passed": self.passed,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressStep {
    pub concurrency: usize,
    pub result: LoadTestResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressTestResult {
    pub name: String,
    pub steps: Vec<StressStep>,
    /// Concurrency of the first step whose error rate crossed the threshold.
    pub breaking_point: Option<usize>,
    pub max_rps: f64,
    pub elapsed: Duration,
}

impl StressTestResult {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "breaking_point": self.breaking_point,
            "max_rps": self.max_rps,
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "steps": self.steps.iter().map(|s| s.result.to_json()).collect::<Vec<_>>(),
        })
    }
}

/// Nearest-rank percentile over sorted latencies.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn top_errors(samples: &[Sample]) -> Vec<ErrorCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for error in samples.iter().filter_map(|s| s.error.as_deref()) {
        *counts.entry(error).or_default() += 1;
    }
    let mut errors: Vec<ErrorCount> = counts
        .into_iter()
        .map(|(message, count)| ErrorCount {
            message: message.to_string(),
            count,
        })
        .collect();
    errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    errors.truncate(TOP_ERRORS);
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_core::types::DurationSpec;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample(latency_ms: u64, error: Option<&str>) -> Sample {
        Sample {
            latency: ms(latency_ms),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn nearest_rank_percentiles() {
        let sorted: Vec<Duration> = (1..=100).map(ms).collect();
        assert_eq!(percentile(&sorted, 50.0), ms(50));
        assert_eq!(percentile(&sorted, 95.0), ms(95));
        assert_eq!(percentile(&sorted, 99.0), ms(99));
        assert_eq!(percentile(&[ms(7)], 99.0), ms(7));
        assert_eq!(percentile(&[], 50.0), Duration::ZERO);
    }

    #[test]
    fn aggregates_samples() {
        let samples = vec![
            sample(10, None),
            sample(30, None),
            sample(20, Some("HTTP 503")),
            sample(40, Some("HTTP 503")),
            sample(50, Some("timeout after 1s")),
        ];
        let r = LoadTestResult::from_samples("t", 2, &samples, Duration::from_secs(2));
        assert_eq!(r.total_requests, 5);
        assert_eq!(r.successful_requests, 2);
        assert_eq!(r.failed_requests, 3);
        assert_eq!(r.min_latency, ms(10));
        assert_eq!(r.max_latency, ms(50));
        assert_eq!(r.avg_latency, ms(30));
        assert!((r.requests_per_second - 2.5).abs() < f64::EPSILON);
        assert!((r.error_rate - 60.0).abs() < f64::EPSILON);
        assert_eq!(r.top_errors[0], ErrorCount { message: "HTTP 503".into(), count: 2 });
        assert!(r.is_breaking());
    }

    #[test]
    fn thresholds_collect_every_violation() {
        let samples = vec![sample(100, None), sample(300, Some("boom"))];
        let mut r = LoadTestResult::from_samples("t", 1, &samples, Duration::from_secs(1));
        r.apply_thresholds(&Thresholds {
            max_latency: Some(DurationSpec::from_millis(200)),
            min_rps: Some(10.0),
            max_error_rate: Some(5.0),
            max_p95_latency: None,
        });
        assert!(!r.passed);
        assert_eq!(r.threshold_violations.len(), 3);

        r.apply_thresholds(&Thresholds::default());
        assert!(r.passed);
        assert!(r.threshold_violations.is_empty());
    }
}
