use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use apiflow_core::expressions::evaluate_condition;
use apiflow_core::types::{Captures, StepGroup, Workflow};
use apiflow_core::VariableStore;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use tokio::task::{JoinError, JoinHandle};
use tracing::error;
use uuid::Uuid;

use crate::executor::concurrency::ConcurrencyLimits;
use crate::executor::events::{Event, EventSink, TracingEventSink};
use crate::executor::result::{ExecutionError, ResultKind, RunSummary, TestResult};
use crate::executor::types::ExecutorConfig;
use crate::load::LoadTester;
use crate::transport::TransportRegistry;

/// Variables a unit of work bound in the store, merged into the parent store
/// after a parallel join.
pub(crate) type Bindings = BTreeMap<String, JsonValue>;

pub(crate) struct UnitOutcome {
    pub result: TestResult,
    pub bindings: Bindings,
}

impl UnitOutcome {
    pub fn new(result: TestResult) -> Self {
        Self {
            result,
            bindings: Bindings::new(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub global_captures: Arc<Captures>,
}

type TaskHandle = JoinHandle<Result<UnitOutcome, ExecutionError>>;

/// Runs resolved workflows. Cloning is cheap; clones share transports,
/// concurrency limits and the event sink.
#[derive(Clone)]
pub struct Executor {
    pub(crate) config: Arc<ExecutorConfig>,
    pub(crate) transports: Arc<TransportRegistry>,
    pub(crate) limits: ConcurrencyLimits,
    pub(crate) event_sink: Arc<dyn EventSink>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let transports = TransportRegistry::with_defaults(config.max_response_bytes);
        let limits = ConcurrencyLimits::new(config.max_parallel, &config.per_protocol_concurrency);
        Self {
            config: Arc::new(config),
            transports: Arc::new(transports),
            limits,
            event_sink: Arc::new(TracingEventSink),
        }
    }

    pub fn with_transports(mut self, transports: TransportRegistry) -> Self {
        self.transports = Arc::new(transports);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// A load tester sharing this executor's transports and timeouts.
    pub fn load_tester(&self) -> LoadTester {
        LoadTester::from_parts(self.config.clone(), self.transports.clone())
    }

    /// Runs every top-level step, then every group, in declared order.
    pub async fn execute(&self, workflow: &Workflow) -> Result<Vec<TestResult>, ExecutionError> {
        let store = VariableStore::from_workflow(workflow);
        self.execute_with_store(workflow, store)
            .await
            .map(|(results, _)| results)
    }

    /// Like [`Executor::execute`], starting from `store` and returning it with
    /// every capture applied.
    pub async fn execute_with_store(
        &self,
        workflow: &Workflow,
        mut store: VariableStore,
    ) -> Result<(Vec<TestResult>, VariableStore), ExecutionError> {
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            global_captures: Arc::new(workflow.captures.clone()),
        };
        self.emit(Event::RunStarted {
            run_id: ctx.run_id,
            workflow: workflow.name.clone(),
        })
        .await;

        let mut results = Vec::with_capacity(workflow.steps.len() + workflow.groups.len());
        for step in &workflow.steps {
            results.push(self.run_step(&ctx, step, &mut store).await?.result);
        }
        for group in &workflow.groups {
            results.push(self.run_group(&ctx, group, &mut store).await?.result);
        }

        self.emit(Event::RunFinished {
            run_id: ctx.run_id,
            summary: RunSummary::from_results(&results),
        })
        .await;
        Ok((results, store))
    }

    pub(crate) async fn emit(&self, event: Event) {
        self.event_sink.emit(event).await;
    }

    pub(crate) fn run_group<'a>(
        &'a self,
        ctx: &'a RunContext,
        group: &'a StepGroup,
        store: &'a mut VariableStore,
    ) -> BoxFuture<'a, Result<UnitOutcome, ExecutionError>> {
        async move {
            if let Some(condition) = &group.condition {
                if !evaluate_condition(condition, store) {
                    self.emit(Event::StepSkipped {
                        run_id: ctx.run_id,
                        step: group.name.clone(),
                        condition: condition.clone(),
                    })
                    .await;
                    return Ok(UnitOutcome::new(TestResult::skipped(&group.name, ResultKind::Group)));
                }
            }

            self.emit(Event::GroupStarted {
                run_id: ctx.run_id,
                group: group.name.clone(),
                parallel: group.parallel,
            })
            .await;
            let started = Instant::now();
            let (children, bindings) = if group.parallel {
                self.run_members_parallel(ctx, group, store).await?
            } else {
                self.run_members_sequential(ctx, group, store).await?
            };
            let result = TestResult::aggregate(&group.name, ResultKind::Group, children, started.elapsed());
            self.emit(Event::GroupFinished {
                run_id: ctx.run_id,
                group: group.name.clone(),
                status: result.status,
            })
            .await;
            Ok(UnitOutcome { result, bindings })
        }
        .boxed()
    }

    async fn run_members_sequential(
        &self,
        ctx: &RunContext,
        group: &StepGroup,
        store: &mut VariableStore,
    ) -> Result<(Vec<TestResult>, Bindings), ExecutionError> {
        let mut children = Vec::with_capacity(group.steps.len() + group.groups.len());
        let mut bindings = Bindings::new();
        for step in &group.steps {
            let outcome = self.run_step(ctx, step, store).await?;
            bindings.extend(outcome.bindings);
            children.push(outcome.result);
        }
        for nested in &group.groups {
            let outcome = self.run_group(ctx, nested, store).await?;
            bindings.extend(outcome.bindings);
            children.push(outcome.result);
        }
        Ok((children, bindings))
    }

    /// One task per member, each with its own copy of the store. Results come
    /// back in declared order; bindings are merged in that same order.
    async fn run_members_parallel(
        &self,
        ctx: &RunContext,
        group: &StepGroup,
        store: &mut VariableStore,
    ) -> Result<(Vec<TestResult>, Bindings), ExecutionError> {
        let mut handles: Vec<(String, ResultKind, TaskHandle)> = Vec::new();
        for step in &group.steps {
            let exec = self.clone();
            let ctx = ctx.clone();
            let step = step.clone();
            let mut task_store = store.clone();
            handles.push((
                step.name.clone(),
                ResultKind::Step,
                tokio::spawn(async move { exec.run_step(&ctx, &step, &mut task_store).await }),
            ));
        }
        for nested in &group.groups {
            let exec = self.clone();
            let ctx = ctx.clone();
            let nested = nested.clone();
            let mut task_store = store.clone();
            handles.push((
                nested.name.clone(),
                ResultKind::Group,
                tokio::spawn(async move { exec.run_group(&ctx, &nested, &mut task_store).await }),
            ));
        }
        join_in_order(handles, store).await
    }
}

/// Awaits every handle in order, merging each task's bindings into `store`.
pub(crate) async fn join_in_order(
    handles: Vec<(String, ResultKind, TaskHandle)>,
    store: &mut VariableStore,
) -> Result<(Vec<TestResult>, Bindings), ExecutionError> {
    let mut children = Vec::with_capacity(handles.len());
    let mut bindings = Bindings::new();
    for (name, kind, handle) in handles {
        let outcome = join_outcome(name, kind, handle.await)?;
        store.extend(outcome.bindings.clone());
        bindings.extend(outcome.bindings);
        children.push(outcome.result);
    }
    Ok((children, bindings))
}

/// A panicked task becomes a failed result; any other join error aborts the run.
fn join_outcome(
    name: String,
    kind: ResultKind,
    joined: Result<Result<UnitOutcome, ExecutionError>, JoinError>,
) -> Result<UnitOutcome, ExecutionError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            error!(unit = %name, kind = kind.as_str(), "task panicked");
            Ok(UnitOutcome::new(TestResult::failed(name, kind, format!("task panicked: {e}"))))
        }
        Err(e) => Err(ExecutionError::TaskJoin(format!("{name}: {e}"))),
    }
}
