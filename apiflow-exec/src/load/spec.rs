use std::time::Duration;

use apiflow_core::types::{deserialize_duration, DurationSpec, Request, Validation, Variables};

use crate::load::LoadTestError;

/// One request template driven by a fixed pool of workers for a fixed time.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoadTestSpec {
    #[serde(default)]
    pub name: String,
    pub concurrency: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Target aggregate requests per second across all workers.
    #[serde(default)]
    pub rate: Option<f64>,
    pub request: Request,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub validate: Vec<Validation>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Per-dispatch timeout; falls back to the request's, then the executor default.
    #[serde(default)]
    pub timeout: Option<DurationSpec>,
}

impl LoadTestSpec {
    pub fn new(concurrency: usize, duration: Duration, request: Request) -> Self {
        Self {
            name: String::new(),
            concurrency,
            duration,
            rate: None,
            request,
            variables: Variables::new(),
            validate: Vec::new(),
            thresholds: Thresholds::default(),
            timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.concurrency == 0 {
            return Err(LoadTestError::InvalidSpec("concurrency must be at least 1".into()));
        }
        if self.duration.is_zero() {
            return Err(LoadTestError::InvalidSpec("duration must be positive".into()));
        }
        check_rate(self.rate)?;
        self.worker_interval().map(|_| ())
    }

    /// Pause each worker takes between dispatches so the pool approximates `rate`.
    pub fn worker_interval(&self) -> Result<Option<Duration>, LoadTestError> {
        let Some(rate) = self.rate else {
            return Ok(None);
        };
        let per_worker = rate / self.concurrency as f64;
        Duration::try_from_secs_f64(1.0 / per_worker)
            .map(Some)
            .map_err(|e| LoadTestError::InvalidSpec(format!("rate {rate} is out of range: {e}")))
    }
}

/// Limits that turn a load test result into a pass/fail verdict.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max_latency: Option<DurationSpec>,
    pub min_rps: Option<f64>,
    /// Percentage, 0 to 100.
    pub max_error_rate: Option<f64>,
    pub max_p95_latency: Option<DurationSpec>,
}

/// Load tests at increasing concurrency until `max_concurrency` or the
/// breaking point.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StressTestSpec {
    #[serde(default)]
    pub name: String,
    pub initial_concurrency: usize,
    pub max_concurrency: usize,
    pub step_increase: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub step_duration: Duration,
    #[serde(default)]
    pub rate: Option<f64>,
    pub request: Request,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub validate: Vec<Validation>,
    #[serde(default)]
    pub timeout: Option<DurationSpec>,
    /// Keep stepping after the breaking point is found.
    #[serde(default)]
    pub continue_after_break: bool,
}

impl StressTestSpec {
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.initial_concurrency == 0 {
            return Err(LoadTestError::InvalidSpec("initial_concurrency must be at least 1".into()));
        }
        if self.initial_concurrency > self.max_concurrency {
            return Err(LoadTestError::InvalidSpec(format!(
                "initial_concurrency {} exceeds max_concurrency {}",
                self.initial_concurrency, self.max_concurrency
            )));
        }
        if self.step_increase == 0 {
            return Err(LoadTestError::InvalidSpec("step_increase must be at least 1".into()));
        }
        if self.step_duration.is_zero() {
            return Err(LoadTestError::InvalidSpec("step_duration must be positive".into()));
        }
        check_rate(self.rate)?;
        // The widest interval is at the highest level.
        self.step_spec(self.max_concurrency).worker_interval().map(|_| ())
    }

    /// Concurrency levels to run, clamped so the last level is `max_concurrency`.
    pub fn levels(&self) -> Vec<usize> {
        let mut levels = Vec::new();
        let mut current = self.initial_concurrency;
        loop {
            levels.push(current);
            if current >= self.max_concurrency {
                break;
            }
            current = (current + self.step_increase).min(self.max_concurrency);
        }
        levels
    }

    pub(crate) fn step_spec(&self, concurrency: usize) -> LoadTestSpec {
        LoadTestSpec {
            name: format!("{} @ {concurrency}", self.name),
            concurrency,
            duration: self.step_duration,
            rate: self.rate,
            request: self.request.clone(),
            variables: self.variables.clone(),
            validate: self.validate.clone(),
            thresholds: Thresholds::default(),
            timeout: self.timeout,
        }
    }
}

fn check_rate(rate: Option<f64>) -> Result<(), LoadTestError> {
    match rate {
        Some(r) if !(r.is_finite() && r > 0.0) => {
            Err(LoadTestError::InvalidSpec(format!("rate must be positive, got {r}")))
        }
        _ => Ok(()),
    }
}
