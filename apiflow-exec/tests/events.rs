mod common;

use std::sync::{Arc, Mutex};

use apiflow_exec::executor::FailureKind;
use apiflow_exec::{
    CompositeEventSink, Event, EventSink, Executor, ExecutorConfig, MetricsCollector, MetricsEventSink,
    NoOpEventSink,
};
use async_trait::async_trait;

use common::{registry, workflow, MockTransport, Route};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Event::RunStarted { .. } => "run_started",
                Event::RunFinished { .. } => "run_finished",
                Event::StepStarted { .. } => "step_started",
                Event::StepSkipped { .. } => "step_skipped",
                Event::AttemptStarted { .. } => "attempt_started",
                Event::AttemptFailed { .. } => "attempt_failed",
                Event::StepPassed { .. } => "step_passed",
                Event::StepFailed { .. } => "step_failed",
                Event::CaptureMissed { .. } => "capture_missed",
                Event::GroupStarted { .. } => "group_started",
                Event::GroupFinished { .. } => "group_finished",
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

const WORKFLOW: &str = r#"
name: observed
steps:
  - name: ok
    request: { url: "http://x/ok" }
    capture: { gone: $.missing }
  - name: bad
    retry: 2
    retry_delay: 10ms
    request: { url: "http://x/bad" }
    validate: [{ type: status_code, expected: 200 }]
  - name: skipped
    condition: "{{never}}"
    request: { url: "http://x/ok" }
"#;

fn mock() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new()
            .route("http://x/ok", Route::ok(r#"{"id": 1}"#))
            .route("http://x/bad", Route::status(500, "")),
    )
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_arrive_in_order() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let sink = Arc::new(RecordingSink::default());
    let composite = CompositeEventSink::new()
        .with(sink.clone())
        .with(Arc::new(NoOpEventSink));
    let exec = Executor::new(ExecutorConfig::default())
        .with_transports(registry(mock()))
        .with_event_sink(Arc::new(composite));

    exec.execute(&workflow(WORKFLOW)).await.unwrap();

    assert_eq!(
        sink.names(),
        vec![
            "run_started",
            "step_started",
            "attempt_started",
            "capture_missed",
            "step_passed",
            "step_started",
            "attempt_started",
            "attempt_failed",
            "attempt_started",
            "attempt_failed",
            "step_failed",
            "step_skipped",
            "run_finished",
        ]
    );

    let events = sink.events.lock().unwrap();
    let retry_in: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::AttemptFailed { kind, retry_in, .. } => Some((*kind, *retry_in)),
            _ => None,
        })
        .collect();
    assert_eq!(retry_in[0].0, FailureKind::Validation);
    assert!(retry_in[0].1.is_some());
    assert_eq!(retry_in[1].1, None);
}

#[tokio::test(start_paused = true)]
async fn metrics_sink_counts_the_run() {
    let collector = MetricsCollector::default();
    let sink = MetricsEventSink::new(collector.clone(), Arc::new(NoOpEventSink));
    let exec = Executor::new(ExecutorConfig::default())
        .with_transports(registry(mock()))
        .with_event_sink(Arc::new(sink));

    exec.execute(&workflow(WORKFLOW)).await.unwrap();

    let m = collector.get_metrics().await;
    assert_eq!(m.workflow, "observed");
    assert_eq!(m.status, "failed");
    assert_eq!(m.steps_total, 3);
    assert_eq!(m.steps_passed, 1);
    assert_eq!(m.steps_failed, 1);
    assert_eq!(m.steps_skipped, 1);
    assert_eq!(m.requests, 3);
    assert_eq!(m.retries, 1);
    assert_eq!(m.validation_failures, 2);
    assert_eq!(m.capture_misses, 1);
    assert!(m.total_duration.is_some());
}
