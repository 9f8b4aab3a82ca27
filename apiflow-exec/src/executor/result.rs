use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Which unit of work a [`TestResult`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Step,
    Group,
    Iteration,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Step => "step",
            ResultKind::Group => "group",
            ResultKind::Iteration => "iteration",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub rule: String,
    pub passed: bool,
    pub actual: Option<JsonValue>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub kind: ResultKind,
    pub status: StepStatus,
    pub duration: Duration,
    pub error: Option<String>,
    pub validations: Vec<ValidationResult>,
    pub captured: BTreeMap<String, JsonValue>,
    pub attempts: u32,
    pub retries: u32,
    /// `METHOD url` of the last dispatched request.
    pub request: Option<String>,
    pub status_code: Option<u16>,
    /// Per-iteration results of a repeated step, or member results of a group.
    pub children: Vec<TestResult>,
}

impl TestResult {
    pub fn new(name: impl Into<String>, kind: ResultKind, status: StepStatus) -> Self {
        Self {
            name: name.into(),
            kind,
            status,
            duration: Duration::ZERO,
            error: None,
            validations: Vec::new(),
            captured: BTreeMap::new(),
            attempts: 0,
            retries: 0,
            request: None,
            status_code: None,
            children: Vec::new(),
        }
    }

    pub fn skipped(name: impl Into<String>, kind: ResultKind) -> Self {
        Self::new(name, kind, StepStatus::Skipped)
    }

    pub fn failed(name: impl Into<String>, kind: ResultKind, error: impl Into<String>) -> Self {
        let mut r = Self::new(name, kind, StepStatus::Failed);
        r.error = Some(error.into());
        r
    }

    /// Parent result whose status is derived from `children`.
    pub fn aggregate(
        name: impl Into<String>,
        kind: ResultKind,
        children: Vec<TestResult>,
        duration: Duration,
    ) -> Self {
        let failed: Vec<&str> = children
            .iter()
            .filter(|c| c.status == StepStatus::Failed)
            .map(|c| c.name.as_str())
            .collect();
        let mut r = Self::new(
            name,
            kind,
            if failed.is_empty() {
                StepStatus::Passed
            } else {
                StepStatus::Failed
            },
        );
        if !failed.is_empty() {
            r.error = Some(format!("failed: {}", failed.join(", ")));
        }
        r.duration = duration;
        r.children = children;
        r
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "kind": self.kind.as_str(),
            "status": self.status.as_str(),
            "duration_ms": self.duration.as_millis() as u64,
            "error": self.error,
            "attempts": self.attempts,
            "retries": self.retries,
            "request": self.request,
            "status_code": self.status_code,
            "captured": self.captured,
            "validations": self.validations.iter().map(|v| json!({
                "rule": v.rule,
                "passed": v.passed,
                "actual": v.actual,
                "message": v.message,
            })).collect::<Vec<_>>(),
            "children": self.children.iter().map(TestResult::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Leaf counts over a run's results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
}

impl RunSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = Self::default();
        for r in results {
            summary.duration += r.duration;
            summary.count(r);
        }
        summary
    }

    fn count(&mut self, r: &TestResult) {
        if !r.children.is_empty() {
            for c in &r.children {
                self.count(c);
            }
            return;
        }
        self.total += 1;
        match r.status {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
        }
    }

    /// A run fails iff at least one step failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("task join error: {0}")]
    TaskJoin(String),
}
