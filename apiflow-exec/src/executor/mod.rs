pub mod concurrency;
mod criteria;
pub mod events;
pub mod metrics;
mod repeat;
mod result;
mod scheduler;
mod step_runner;
mod types;

pub use concurrency::{ConcurrencyLimits, ConcurrencyPermit};
pub use criteria::{all_passed, evaluate_rules, ResponseView};
pub use events::{
    CompositeEventSink, Event, EventSink, FailureKind, NoOpEventSink, StdoutEventSink,
    TracingEventSink,
};
pub use metrics::{MetricsCollector, MetricsEventSink, RunMetrics};
pub use result::{ExecutionError, ResultKind, RunSummary, StepStatus, TestResult, ValidationResult};
pub use scheduler::Executor;
pub use types::ExecutorConfig;
