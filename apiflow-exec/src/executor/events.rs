use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::result::{RunSummary, StepStatus};

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Substitution,
    Transport,
    Validation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Substitution => "substitution",
            FailureKind::Transport => "transport",
            FailureKind::Validation => "validation",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        workflow: String,
    },
    RunFinished {
        run_id: Uuid,
        summary: RunSummary,
    },
    StepStarted {
        run_id: Uuid,
        step: String,
    },
    /// A step or group whose condition was falsy.
    StepSkipped {
        run_id: Uuid,
        step: String,
        condition: String,
    },
    AttemptStarted {
        run_id: Uuid,
        step: String,
        attempt: u32,
    },
    AttemptFailed {
        run_id: Uuid,
        step: String,
        attempt: u32,
        kind: FailureKind,
        error: String,
        retry_in: Option<Duration>,
    },
    StepPassed {
        run_id: Uuid,
        step: String,
        attempts: u32,
        duration: Duration,
    },
    StepFailed {
        run_id: Uuid,
        step: String,
        attempts: u32,
        error: String,
    },
    CaptureMissed {
        run_id: Uuid,
        step: String,
        name: String,
        path: String,
        reason: String,
    },
    GroupStarted {
        run_id: Uuid,
        group: String,
        parallel: bool,
    },
    GroupFinished {
        run_id: Uuid,
        group: String,
        status: StepStatus,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.add(sink);
        self
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// Structured `tracing` logs; the executor's default sink.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        match event {
            Event::RunStarted { run_id, workflow } => {
                info!(%run_id, %workflow, "run started");
            }
            Event::RunFinished { run_id, summary } => {
                info!(
                    %run_id,
                    total = summary.total,
                    passed = summary.passed,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    success = summary.is_success(),
                    "run finished"
                );
            }
            Event::StepStarted { run_id, step } => {
                info!(%run_id, %step, "step started");
            }
            Event::StepSkipped {
                run_id,
                step,
                condition,
            } => {
                info!(%run_id, %step, %condition, "skipped: condition is false");
            }
            Event::AttemptStarted {
                run_id,
                step,
                attempt,
            } => {
                debug!(%run_id, %step, attempt, "attempt started");
            }
            Event::AttemptFailed {
                run_id,
                step,
                attempt,
                kind,
                error,
                retry_in,
            } => {
                warn!(
                    %run_id,
                    %step,
                    attempt,
                    kind = kind.as_str(),
                    retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                    "attempt failed: {error}"
                );
            }
            Event::StepPassed {
                run_id,
                step,
                attempts,
                duration,
            } => {
                info!(
                    %run_id,
                    %step,
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    "step passed"
                );
            }
            Event::StepFailed {
                run_id,
                step,
                attempts,
                error,
            } => {
                warn!(%run_id, %step, attempts, "step failed: {error}");
            }
            Event::CaptureMissed {
                run_id,
                step,
                name,
                path,
                reason,
            } => {
                warn!(%run_id, %step, capture = %name, %path, "capture missed: {reason}");
            }
            Event::GroupStarted {
                run_id,
                group,
                parallel,
            } => {
                info!(%run_id, %group, parallel, "group started");
            }
            Event::GroupFinished {
                run_id,
                group,
                status,
            } => {
                info!(%run_id, %group, status = status.as_str(), "group finished");
            }
        }
    }
}

/// One JSON object per line on stdout.
pub struct StdoutEventSink;

impl StdoutEventSink {
    pub fn to_json(event: &Event) -> serde_json::Value {
        match event {
            Event::RunStarted { run_id, workflow } => {
                json!({ "type": "run.started", "run_id": run_id.to_string(), "workflow": workflow })
            }
            Event::RunFinished { run_id, summary } => {
                json!({
                    "type": "run.finished",
                    "run_id": run_id.to_string(),
                    "success": summary.is_success(),
                    "total": summary.total,
                    "passed": summary.passed,
                    "failed": summary.failed,
                    "skipped": summary.skipped,
                })
            }
            Event::StepStarted { run_id, step } => {
                json!({ "type": "step.started", "run_id": run_id.to_string(), "step": step })
            }
            Event::StepSkipped { run_id, step, condition } => {
                json!({ "type": "step.skipped", "run_id": run_id.to_string(), "step": step, "condition": condition })
            }
            Event::AttemptStarted { run_id, step, attempt } => {
                json!({ "type": "attempt.started", "run_id": run_id.to_string(), "step": step, "attempt": attempt })
            }
            Event::AttemptFailed { run_id, step, attempt, kind, error, retry_in } => {
                json!({
                    "type": "attempt.failed",
                    "run_id": run_id.to_string(),
                    "step": step,
                    "attempt": attempt,
                    "kind": kind.as_str(),
                    "error": error,
                    "retry_in_ms": retry_in.map(|d| d.as_millis() as u64),
                })
            }
            Event::StepPassed { run_id, step, attempts, duration } => {
                json!({ "type": "step.passed", "run_id": run_id.to_string(), "step": step, "attempts": attempts, "duration_ms": duration.as_millis() as u64 })
            }
            Event::StepFailed { run_id, step, attempts, error } => {
                json!({ "type": "step.failed", "run_id": run_id.to_string(), "step": step, "attempts": attempts, "error": error })
            }
            Event::CaptureMissed { run_id, step, name, path, reason } => {
                json!({ "type": "capture.missed", "run_id": run_id.to_string(), "step": step, "name": name, "path": path, "reason": reason })
            }
            Event::GroupStarted { run_id, group, parallel } => {
                json!({ "type": "group.started", "run_id": run_id.to_string(), "group": group, "parallel": parallel })
            }
            Event::GroupFinished { run_id, group, status } => {
                json!({ "type": "group.finished", "run_id": run_id.to_string(), "group": group, "status": status.as_str() })
            }
        }
    }
}

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        println!(
            "{}",
            serde_json::to_string(&Self::to_json(&event)).unwrap_or_default()
        );
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_json_shape() {
        let run_id = Uuid::new_v4();
        let v = StdoutEventSink::to_json(&Event::AttemptFailed {
            run_id,
            step: "login".into(),
            attempt: 2,
            kind: FailureKind::Validation,
            error: "status_code == 200 (actual 500)".into(),
            retry_in: Some(Duration::from_millis(250)),
        });
        assert_eq!(v["type"], "attempt.failed");
        assert_eq!(v["kind"], "validation");
        assert_eq!(v["retry_in_ms"], 250);
        assert_eq!(v["run_id"], run_id.to_string());
    }
}
