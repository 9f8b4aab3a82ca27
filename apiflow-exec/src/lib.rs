//! Execution, retry and load-testing engine for apiflow workflows.
//!
//! [`Executor`] runs a resolved [`apiflow_core::Workflow`]; [`LoadTester`]
//! drives a single request template under sustained or stepped load. Both
//! dispatch through the protocol [`Transport`]s in a [`TransportRegistry`].

#![forbid(unsafe_code)]

pub mod executor;
pub mod load;
pub mod retry;
pub mod transport;

pub use executor::{
    CompositeEventSink, Event, EventSink, ExecutionError, Executor, ExecutorConfig,
    MetricsCollector, MetricsEventSink, NoOpEventSink, ResultKind, RunMetrics, RunSummary,
    StdoutEventSink, StepStatus, TestResult, TracingEventSink, ValidationResult,
};
pub use load::{
    LoadTestError, LoadTestResult, LoadTestSpec, LoadTester, StressTestResult, StressTestSpec,
    Thresholds,
};
pub use retry::RetryConfig;
pub use transport::{
    ResolvedRequest, ReqwestHttpTransport, Transport, TransportError, TransportRegistry,
    TransportResponse,
};
