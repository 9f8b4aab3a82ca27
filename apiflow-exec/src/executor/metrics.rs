use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::executor::events::{Event, EventSink, FailureKind};
use crate::executor::result::RunSummary;

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub run_id: uuid::Uuid,
    pub workflow: String,
    pub status: String,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub total_duration: Option<Duration>,
    pub steps_total: usize,
    pub steps_passed: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub retries: usize,
    pub requests: usize,
    pub transport_errors: usize,
    pub validation_failures: usize,
    pub capture_misses: usize,
}

impl RunMetrics {
    pub fn new(run_id: uuid::Uuid, workflow: String) -> Self {
        Self {
            run_id,
            workflow,
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_step_passed(&mut self) {
        self.steps_passed += 1;
        self.steps_total += 1;
    }

    pub fn record_step_failed(&mut self) {
        self.steps_failed += 1;
        self.steps_total += 1;
    }

    pub fn record_step_skipped(&mut self) {
        self.steps_skipped += 1;
        self.steps_total += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    pub fn record_attempt_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Transport => self.transport_errors += 1,
            FailureKind::Validation => self.validation_failures += 1,
            FailureKind::Substitution => {}
        }
    }

    pub fn record_capture_miss(&mut self) {
        self.capture_misses += 1;
    }

    pub fn finish(&mut self, summary: &RunSummary) {
        self.status = if summary.is_success() { "passed" } else { "failed" }.to_string();
        self.finished_at = Some(Instant::now());
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            self.total_duration = Some(finished.duration_since(started));
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "workflow": self.workflow,
            "status": self.status,
            "duration_ms": self.total_duration.map(|d| d.as_millis() as u64),
            "steps": {
                "total": self.steps_total,
                "passed": self.steps_passed,
                "failed": self.steps_failed,
                "skipped": self.steps_skipped,
                "retries": self.retries,
            },
            "requests": {
                "total": self.requests,
                "transport_errors": self.transport_errors,
                "validation_failures": self.validation_failures,
            },
            "capture_misses": self.capture_misses,
        })
    }
}

#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<RunMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(RunMetrics::default())),
        }
    }
}

impl MetricsCollector {
    pub fn new(run_id: uuid::Uuid, workflow: String) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(RunMetrics::new(run_id, workflow))),
        }
    }

    pub async fn apply(&self, event: &Event) {
        let mut m = self.metrics.lock().await;
        match event {
            Event::RunStarted { run_id, workflow } => {
                *m = RunMetrics::new(*run_id, workflow.clone());
            }
            Event::StepPassed { .. } => m.record_step_passed(),
            Event::StepFailed { .. } => m.record_step_failed(),
            Event::StepSkipped { .. } => m.record_step_skipped(),
            Event::AttemptStarted { .. } => m.record_request(),
            Event::AttemptFailed { kind, retry_in, .. } => {
                m.record_attempt_failure(*kind);
                if retry_in.is_some() {
                    m.record_retry();
                }
            }
            Event::CaptureMissed { .. } => m.record_capture_miss(),
            Event::RunFinished { summary, .. } => m.finish(summary),
            Event::GroupStarted { .. } | Event::GroupFinished { .. } | Event::StepStarted { .. } => {}
        }
    }

    pub async fn get_metrics(&self) -> RunMetrics {
        self.metrics.lock().await.clone()
    }
}

/// Feeds every event into a [`MetricsCollector`], then forwards it.
pub struct MetricsEventSink {
    collector: MetricsCollector,
    base: Arc<dyn EventSink>,
}

impl MetricsEventSink {
    pub fn new(collector: MetricsCollector, base: Arc<dyn EventSink>) -> Self {
        Self { collector, base }
    }
}

#[async_trait]
impl EventSink for MetricsEventSink {
    async fn emit(&self, event: Event) {
        self.collector.apply(&event).await;
        self.base.emit(event).await;
    }
}
