use std::time::Instant;

use apiflow_core::types::{RepeatSpec, Step};
use apiflow_core::VariableStore;
use serde_json::json;

use crate::executor::result::{ExecutionError, ResultKind, TestResult};
use crate::executor::scheduler::{join_in_order, Bindings, Executor, RunContext, UnitOutcome};

impl Executor {
    /// Runs the step body `repeat.count` times. The parent result passes only
    /// if every iteration passed.
    pub(crate) async fn run_repeat(
        &self,
        ctx: &RunContext,
        step: &Step,
        repeat: &RepeatSpec,
        store: &mut VariableStore,
    ) -> Result<UnitOutcome, ExecutionError> {
        let started = Instant::now();
        let (children, bindings) = if repeat.parallel {
            let mut handles = Vec::with_capacity(repeat.count as usize);
            for i in 1..=repeat.count {
                let exec = self.clone();
                let ctx = ctx.clone();
                let step = step.clone();
                let label = iteration_label(&step.name, i);
                let mut iter_store = iteration_store(store, repeat, i);
                let task_label = label.clone();
                handles.push((
                    label,
                    ResultKind::Iteration,
                    tokio::spawn(async move {
                        Ok::<_, ExecutionError>(exec
                            .run_attempts(&ctx, &step, &task_label, ResultKind::Iteration, &mut iter_store)
                            .await)
                    }),
                ));
            }
            join_in_order(handles, store).await?
        } else {
            let mut children = Vec::with_capacity(repeat.count as usize);
            let mut bindings = Bindings::new();
            for i in 1..=repeat.count {
                if i > 1 {
                    if let Some(delay) = repeat.delay {
                        tokio::time::sleep(delay.as_duration()).await;
                    }
                }
                let label = iteration_label(&step.name, i);
                let mut iter_store = iteration_store(store, repeat, i);
                let outcome = self
                    .run_attempts(ctx, step, &label, ResultKind::Iteration, &mut iter_store)
                    .await;
                store.extend(outcome.bindings.clone());
                bindings.extend(outcome.bindings);
                children.push(outcome.result);
            }
            (children, bindings)
        };

        let mut result = TestResult::aggregate(&step.name, ResultKind::Step, children, started.elapsed());
        result.attempts = result.children.iter().map(|c| c.attempts).sum();
        result.retries = result.children.iter().map(|c| c.retries).sum();
        Ok(UnitOutcome { result, bindings })
    }
}

fn iteration_label(name: &str, iteration: u32) -> String {
    format!("{name}[{iteration}]")
}

/// Copy of `parent` with `iteration` (1-based), `index` (0-based) and the
/// per-iteration variables bound.
pub(crate) fn iteration_store(parent: &VariableStore, repeat: &RepeatSpec, iteration: u32) -> VariableStore {
    let mut store = parent.clone();
    store.set("iteration", json!(iteration));
    store.set("index", json!(iteration - 1));
    for (name, value) in &repeat.variables {
        let bound = store.substitute_value_lenient(value);
        store.set(name.clone(), bound);
    }
    store
}
