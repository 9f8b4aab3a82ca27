use std::time::{Duration, Instant};

use apiflow_core::expressions::{capture, evaluate_condition, CaptureSource};
use apiflow_core::types::Step;
use apiflow_core::VariableStore;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::executor::criteria::{all_passed, evaluate_rules, ResponseView};
use crate::executor::events::{Event, FailureKind};
use crate::executor::result::{ExecutionError, ResultKind, StepStatus, TestResult, ValidationResult};
use crate::executor::scheduler::{Bindings, Executor, RunContext, UnitOutcome};
use crate::retry::{decide_retry, RetryDecision, RetryReason};
use crate::transport::{resolve_request, TransportError, TransportResponse};

struct AttemptSuccess {
    request: String,
    response: TransportResponse,
    body: String,
    json: Option<JsonValue>,
    validations: Vec<ValidationResult>,
}

struct AttemptFailure {
    kind: FailureKind,
    error: String,
    request: Option<String>,
    status_code: Option<u16>,
    validations: Vec<ValidationResult>,
}

impl AttemptFailure {
    fn new(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            request: None,
            status_code: None,
            validations: Vec::new(),
        }
    }
}

impl From<FailureKind> for RetryReason {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Substitution => RetryReason::Substitution,
            FailureKind::Transport => RetryReason::Transport,
            FailureKind::Validation => RetryReason::Validation,
        }
    }
}

impl Executor {
    /// Condition check, then either the repeat driver or the attempt loop.
    pub(crate) async fn run_step(
        &self,
        ctx: &RunContext,
        step: &Step,
        store: &mut VariableStore,
    ) -> Result<UnitOutcome, ExecutionError> {
        if let Some(condition) = &step.condition {
            if !evaluate_condition(condition, store) {
                self.emit(Event::StepSkipped {
                    run_id: ctx.run_id,
                    step: step.name.clone(),
                    condition: condition.clone(),
                })
                .await;
                return Ok(UnitOutcome::new(TestResult::skipped(&step.name, ResultKind::Step)));
            }
        }
        match &step.repeat {
            Some(repeat) => self.run_repeat(ctx, step, repeat, store).await,
            None => Ok(self
                .run_attempts(ctx, step, &step.name, ResultKind::Step, store)
                .await),
        }
    }

    /// Up to `max(retry, 1)` attempts. Captures are bound into `store` only
    /// after an attempt passes every rule.
    pub(crate) async fn run_attempts(
        &self,
        ctx: &RunContext,
        step: &Step,
        label: &str,
        kind: ResultKind,
        store: &mut VariableStore,
    ) -> UnitOutcome {
        self.emit(Event::StepStarted {
            run_id: ctx.run_id,
            step: label.to_string(),
        })
        .await;

        let started = Instant::now();
        let max_attempts = step.max_attempts();
        let step_delay = step.retry_delay.map(|d| d.as_duration());
        let mut result = TestResult::new(label, kind, StepStatus::Failed);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.emit(Event::AttemptStarted {
                run_id: ctx.run_id,
                step: label.to_string(),
                attempt,
            })
            .await;

            match self.attempt(step, store).await {
                Ok(success) => {
                    let (captured, bindings) = self.apply_captures(ctx, label, step, &success, store).await;
                    result.status = StepStatus::Passed;
                    result.error = None;
                    result.request = Some(success.request);
                    result.status_code = Some(success.response.status);
                    result.validations = success.validations;
                    result.captured = captured;
                    result.attempts = attempt;
                    result.retries = attempt - 1;
                    result.duration = started.elapsed();
                    self.emit(Event::StepPassed {
                        run_id: ctx.run_id,
                        step: label.to_string(),
                        attempts: attempt,
                        duration: result.duration,
                    })
                    .await;
                    return UnitOutcome { result, bindings };
                }
                Err(failure) => {
                    let decision = decide_retry(
                        &self.config.retry,
                        attempt,
                        max_attempts,
                        step_delay,
                        failure.kind.into(),
                        || fastrand::u64(..),
                    );
                    let retry_in = match decision {
                        RetryDecision::RetryAfter { delay, .. } => Some(delay),
                        RetryDecision::Stop { .. } => None,
                    };
                    self.emit(Event::AttemptFailed {
                        run_id: ctx.run_id,
                        step: label.to_string(),
                        attempt,
                        kind: failure.kind,
                        error: failure.error.clone(),
                        retry_in,
                    })
                    .await;

                    result.error = Some(failure.error);
                    result.request = failure.request;
                    result.status_code = failure.status_code;
                    result.validations = failure.validations;

                    match retry_in {
                        Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }

        result.attempts = attempt;
        result.retries = attempt - 1;
        result.duration = started.elapsed();
        self.emit(Event::StepFailed {
            run_id: ctx.run_id,
            step: label.to_string(),
            attempts: attempt,
            error: result.error.clone().unwrap_or_default(),
        })
        .await;
        UnitOutcome::new(result)
    }

    async fn attempt(&self, step: &Step, store: &VariableStore) -> Result<AttemptSuccess, AttemptFailure> {
        let req = resolve_request(&step.request, store)
            .map_err(|e| AttemptFailure::new(FailureKind::Substitution, e.to_string()))?;
        let described = req.describe();
        let transport_failure = |e: TransportError| {
            let mut f = AttemptFailure::new(FailureKind::Transport, e.to_string());
            f.request = Some(described.clone());
            f
        };

        let transport = self.transports.get(&req.protocol).map_err(transport_failure)?;
        let timeout = step
            .timeout
            .or(step.request.timeout)
            .map(|d| d.as_duration())
            .unwrap_or(self.config.default_timeout);

        let response = {
            let _permit = self
                .limits
                .acquire(Some(req.protocol.as_str()))
                .await
                .map_err(|e| transport_failure(TransportError::Other(e.to_string())))?;
            let started = Instant::now();
            match tokio::time::timeout(timeout, transport.send(&req, timeout)).await {
                Err(_) => Err(TransportError::Timeout(timeout)),
                Ok(sent) => sent.map(|mut resp| {
                    if resp.duration == Duration::ZERO {
                        resp.duration = started.elapsed();
                    }
                    resp
                }),
            }
        }
        .map_err(transport_failure)?;

        let body = response.text();
        let json = response.json();
        let view = ResponseView {
            status: response.status,
            headers: &response.headers,
            body: &body,
            json: json.as_ref(),
            elapsed: response.duration,
        };
        let validations = evaluate_rules(&step.validate, &view, store);
        if !all_passed(&validations) {
            let error = validations
                .iter()
                .filter(|v| !v.passed)
                .map(|v| format!("{}: {}", v.rule, v.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AttemptFailure {
                kind: FailureKind::Validation,
                error,
                request: Some(described),
                status_code: Some(response.status),
                validations,
            });
        }

        debug!(request = %described, status = response.status, "attempt passed");
        Ok(AttemptSuccess {
            request: described,
            response,
            body,
            json,
            validations,
        })
    }

    /// Step captures, then workflow-level captures. Returns the step's own
    /// captures and everything bound.
    async fn apply_captures(
        &self,
        ctx: &RunContext,
        label: &str,
        step: &Step,
        success: &AttemptSuccess,
        store: &mut VariableStore,
    ) -> (Bindings, Bindings) {
        let source = CaptureSource {
            status: success.response.status,
            headers: &success.response.headers,
            body: &success.body,
            json: success.json.as_ref(),
        };

        let outcome = capture(&source, &step.capture, store);
        for miss in outcome.misses {
            self.emit(Event::CaptureMissed {
                run_id: ctx.run_id,
                step: label.to_string(),
                name: miss.name,
                path: miss.path,
                reason: miss.reason,
            })
            .await;
        }

        let mut bindings = outcome.captured.clone();
        if !ctx.global_captures.is_empty() {
            let global = capture(&source, &ctx.global_captures, store);
            for miss in &global.misses {
                debug!(step = %label, capture = %miss.name, path = %miss.path, "global capture missed: {}", miss.reason);
            }
            bindings.extend(global.captured);
        }
        (outcome.captured, bindings)
    }
}
