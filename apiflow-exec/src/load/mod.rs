//! Sustained-load and stepped stress testing of a single request template.

mod spec;
mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use apiflow_core::types::{Request, Validation};
use apiflow_core::VariableStore;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::executor::{all_passed, evaluate_rules, ExecutorConfig, ResponseView};
use crate::transport::{resolve_request, TransportError, TransportRegistry};

pub use spec::{LoadTestSpec, StressTestSpec, Thresholds};
pub use stats::{
    percentile, ErrorCount, LoadTestResult, StressStep, StressTestResult, BREAKING_ERROR_RATE,
};
use stats::Sample;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadTestError {
    #[error("invalid load test: {0}")]
    InvalidSpec(String),
    #[error("worker task failed: {0}")]
    TaskJoin(String),
}

/// Drives load and stress tests. Clones share transports.
#[derive(Clone)]
pub struct LoadTester {
    config: Arc<ExecutorConfig>,
    transports: Arc<TransportRegistry>,
}

impl Default for LoadTester {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl LoadTester {
    pub fn new(config: ExecutorConfig) -> Self {
        let transports = TransportRegistry::with_defaults(config.max_response_bytes);
        Self::from_parts(Arc::new(config), Arc::new(transports))
    }

    pub(crate) fn from_parts(config: Arc<ExecutorConfig>, transports: Arc<TransportRegistry>) -> Self {
        Self { config, transports }
    }

    pub fn with_transports(mut self, transports: TransportRegistry) -> Self {
        self.transports = Arc::new(transports);
        self
    }

    pub async fn run_load_test(&self, spec: &LoadTestSpec) -> Result<LoadTestResult, LoadTestError> {
        spec.validate()?;
        info!(
            test = %spec.name,
            concurrency = spec.concurrency,
            duration = ?spec.duration,
            rate = ?spec.rate,
            "load test started"
        );

        let mut base = VariableStore::with_environment(std::env::vars().collect::<BTreeMap<_, _>>());
        base.declare(&spec.variables);
        let ctx = Arc::new(WorkerContext {
            transports: self.transports.clone(),
            request: spec.request.clone(),
            validate: spec.validate.clone(),
            base,
            timeout: spec
                .timeout
                .or(spec.request.timeout)
                .map(|d| d.as_duration())
                .unwrap_or(self.config.default_timeout),
        });

        let started = Instant::now();
        let deadline = started + spec.duration;
        let interval = spec.worker_interval()?;
        let handles: Vec<_> = (0..spec.concurrency)
            .map(|worker| {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.run_worker(worker, deadline, interval).await })
            })
            .collect();

        let mut samples = Vec::new();
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(worker_samples) => samples.extend(worker_samples),
                Err(e) if e.is_panic() => {
                    warn!(test = %spec.name, worker, "load worker panicked");
                    samples.push(Sample {
                        latency: Duration::ZERO,
                        error: Some(format!("worker {worker} panicked")),
                    });
                }
                Err(e) => return Err(LoadTestError::TaskJoin(format!("worker {worker}: {e}"))),
            }
        }

        let mut result = LoadTestResult::from_samples(&spec.name, spec.concurrency, &samples, started.elapsed());
        result.apply_thresholds(&spec.thresholds);
        info!(
            test = %spec.name,
            total = result.total_requests,
            failed = result.failed_requests,
            rps = result.requests_per_second,
            error_rate = result.error_rate,
            "load test finished"
        );
        for violation in &result.threshold_violations {
            warn!(test = %spec.name, "threshold violated: {violation}");
        }
        Ok(result)
    }

    /// Steps concurrency up until `max_concurrency`. Stops at the first step
    /// whose error rate exceeds [`BREAKING_ERROR_RATE`] unless
    /// `continue_after_break` is set.
    pub async fn run_stress_test(&self, spec: &StressTestSpec) -> Result<StressTestResult, LoadTestError> {
        spec.validate()?;
        let started = Instant::now();
        let mut steps = Vec::new();
        let mut breaking_point = None;
        let mut max_rps: f64 = 0.0;

        for concurrency in spec.levels() {
            let result = self.run_load_test(&spec.step_spec(concurrency)).await?;
            debug!(
                test = %spec.name,
                concurrency,
                rps = result.requests_per_second,
                error_rate = result.error_rate,
                "stress step finished"
            );
            max_rps = max_rps.max(result.requests_per_second);
            let broke = result.is_breaking();
            steps.push(StressStep { concurrency, result });
            if broke && breaking_point.is_none() {
                warn!(test = %spec.name, concurrency, "breaking point reached");
                breaking_point = Some(concurrency);
                if !spec.continue_after_break {
                    break;
                }
            }
        }

        Ok(StressTestResult {
            name: spec.name.clone(),
            steps,
            breaking_point,
            max_rps,
            elapsed: started.elapsed(),
        })
    }
}

struct WorkerContext {
    transports: Arc<TransportRegistry>,
    request: Request,
    validate: Vec<Validation>,
    base: VariableStore,
    timeout: Duration,
}

impl WorkerContext {
    async fn run_worker(&self, worker: usize, deadline: Instant, interval: Option<Duration>) -> Vec<Sample> {
        let mut samples = Vec::new();
        let mut iteration: u64 = 0;
        while Instant::now() < deadline {
            iteration += 1;
            let started = Instant::now();
            let error = self.dispatch(worker, iteration).await.err();
            samples.push(Sample {
                latency: started.elapsed(),
                error,
            });
            if let Some(interval) = interval {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(interval.min(remaining)).await;
            } else {
                // A dispatch that fails before its first await never yields.
                tokio::task::yield_now().await;
            }
        }
        samples
    }

    /// `Ok` when the transport succeeded and every rule passed; with no rules,
    /// when the status is below 400.
    async fn dispatch(&self, worker: usize, iteration: u64) -> Result<(), String> {
        let mut store = self.base.clone();
        store.set("iteration", json!(iteration));
        store.set("worker", json!(worker));

        let req = resolve_request(&self.request, &store).map_err(|e| e.to_string())?;
        let transport = self.transports.get(&req.protocol).map_err(|e| e.to_string())?;
        let response = match tokio::time::timeout(self.timeout, transport.send(&req, self.timeout)).await {
            Err(_) => Err(TransportError::Timeout(self.timeout)),
            Ok(sent) => sent,
        }
        .map_err(|e| e.to_string())?;

        if self.validate.is_empty() {
            return if response.status < 400 {
                Ok(())
            } else {
                Err(format!("HTTP {}", response.status))
            };
        }

        let body = response.text();
        let json = response.json();
        let view = ResponseView {
            status: response.status,
            headers: &response.headers,
            body: &body,
            json: json.as_ref(),
            elapsed: response.duration,
        };
        let results = evaluate_rules(&self.validate, &view, &store);
        if all_passed(&results) {
            Ok(())
        } else {
            Err(results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| format!("{}: {}", r.rule, r.message))
                .collect::<Vec<_>>()
                .join("; "))
        }
    }
}
