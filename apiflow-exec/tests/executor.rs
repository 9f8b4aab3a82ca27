mod common;

use std::sync::Arc;
use std::time::Duration;

use apiflow_exec::{Executor, ExecutorConfig, ResultKind, RunSummary, StepStatus, TransportError};
use serde_json::json;

use common::{registry, workflow, MockTransport, Route};

fn executor(mock: &Arc<MockTransport>) -> Executor {
    Executor::new(ExecutorConfig::default()).with_transports(registry(mock.clone()))
}

#[tokio::test]
async fn captured_value_feeds_the_next_request() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/items", Route::ok(r#"{"id": 7}"#))
            .route("http://x/item/7", Route::ok(r#"{"name": "widget"}"#)),
    );
    let wf = workflow(
        r#"
name: chain
variables:
  base: http://x
steps:
  - name: A
    request:
      method: post
      url: "{{base}}/items"
    capture:
      id: $.id
  - name: B
    request:
      url: "{{base}}/item/{{id}}"
    validate:
      - type: json_path
        path: $.name
        expected: widget
"#,
    );

    let (results, store) = executor(&mock)
        .execute_with_store(&wf, apiflow_core::VariableStore::from_workflow(&wf))
        .await
        .unwrap();

    assert_eq!(mock.urls(), vec!["http://x/items", "http://x/item/7"]);
    assert_eq!(mock.calls()[0].method, "POST");
    assert!(results.iter().all(|r| r.is_passed()));
    assert_eq!(results[0].captured.get("id"), Some(&json!(7)));
    assert_eq!(results[1].request.as_deref(), Some("GET http://x/item/7"));
    assert_eq!(store.get("id"), Some(&json!(7)));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_make_exactly_n_attempts() {
    let mock = Arc::new(MockTransport::new().route("http://x/flaky", Route::status(500, "")));
    let wf = workflow(
        r#"
name: retry
steps:
  - name: flaky
    retry: 3
    retry_delay: 100ms
    request:
      url: http://x/flaky
    validate:
      - type: status_code
        expected: 200
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();

    assert_eq!(mock.count("http://x/flaky"), 3);
    let r = &results[0];
    assert_eq!(r.status, StepStatus::Failed);
    assert_eq!(r.attempts, 3);
    assert_eq!(r.retries, 2);
    assert_eq!(r.status_code, Some(500));
    assert!(r.error.as_deref().unwrap().contains("expected == 200, got 500"));
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_retried_and_scoped_to_the_step() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/down", Route::failing(TransportError::Network("refused".into())))
            .route("http://x/up", Route::ok("{}")),
    );
    let wf = workflow(
        r#"
name: scoped
steps:
  - name: down
    retry: 2
    request:
      url: http://x/down
  - name: up
    request:
      url: http://x/up
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();

    assert_eq!(mock.count("http://x/down"), 2);
    assert_eq!(results[0].status, StepStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("refused"));
    assert_eq!(results[1].status, StepStatus::Passed);
    assert!(!RunSummary::from_results(&results).is_success());
}

#[tokio::test]
async fn falsy_condition_skips_without_dispatch() {
    let mock = Arc::new(MockTransport::new().route("http://x/a", Route::ok("{}")));
    let wf = workflow(
        r#"
name: skip
variables:
  enabled: "false"
steps:
  - name: gated
    condition: "{{enabled}}"
    request:
      url: http://x/a
  - name: unset flag
    condition: "{{missing}}"
    request:
      url: http://x/a
groups:
  - name: gated group
    condition: "{{enabled}} == true"
    steps:
      - name: inner
        request:
          url: http://x/a
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();

    assert!(mock.calls().is_empty());
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status == StepStatus::Skipped));
    assert_eq!(results[2].kind, ResultKind::Group);
}

#[tokio::test]
async fn no_rules_means_transport_success_passes() {
    let mock = Arc::new(MockTransport::new());
    let wf = workflow("name: lenient\nsteps:\n  - name: missing\n    request:\n      url: http://x/nope\n");

    let results = executor(&mock).execute(&wf).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Passed);
    assert_eq!(results[0].status_code, Some(404));
}

#[tokio::test(start_paused = true)]
async fn parallel_group_keeps_declared_order_and_overlaps() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/slow", Route::ok(r#"{"slow": 1}"#).delayed(Duration::from_millis(300)))
            .route("http://x/mid", Route::ok(r#"{"mid": 2}"#).delayed(Duration::from_millis(200)))
            .route("http://x/fast", Route::ok(r#"{"fast": 3}"#).delayed(Duration::from_millis(100))),
    );
    let wf = workflow(
        r#"
name: fan-out
steps:
  - name: after
    request:
      url: http://x/fast
groups:
  - name: fetch
    parallel: true
    steps:
      - name: slow
        request: { url: "http://x/slow" }
        capture: { slow: $.slow }
      - name: mid
        request: { url: "http://x/mid" }
        capture: { mid: $.mid }
      - name: fast
        request: { url: "http://x/fast" }
        capture: { fast: $.fast }
"#,
    );

    let started = tokio::time::Instant::now();
    let (results, store) = executor(&mock)
        .execute_with_store(&wf, apiflow_core::VariableStore::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    let group = &results[1];
    assert_eq!(group.kind, ResultKind::Group);
    assert_eq!(group.status, StepStatus::Passed);
    let names: Vec<_> = group.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["slow", "mid", "fast"]);
    // 100ms for the top-level step, then the group bounded by its slowest member.
    assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
    assert_eq!(store.get("slow"), Some(&json!(1)));
    assert_eq!(store.get("mid"), Some(&json!(2)));
    assert_eq!(store.get("fast"), Some(&json!(3)));
}

#[tokio::test]
async fn parallel_failure_does_not_cancel_siblings() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/ok", Route::ok("{}"))
            .route("http://x/bad", Route::status(500, "")),
    );
    let wf = workflow(
        r#"
name: isolated
groups:
  - name: both
    parallel: true
    steps:
      - name: bad
        request: { url: "http://x/bad" }
        validate: [{ type: status_code, expected: 200 }]
      - name: ok
        request: { url: "http://x/ok" }
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();
    let group = &results[0];
    assert_eq!(group.status, StepStatus::Failed);
    assert_eq!(group.error.as_deref(), Some("failed: bad"));
    assert_eq!(group.children[1].status, StepStatus::Passed);
    let summary = RunSummary::from_results(&results);
    assert_eq!((summary.total, summary.passed, summary.failed), (2, 1, 1));
}

#[tokio::test]
async fn nested_sequential_group_sees_earlier_captures() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/token", Route::ok(r#"{"token": "t-1"}"#))
            .route("http://x/me", Route::ok("{}")),
    );
    let wf = workflow(
        r#"
name: nested
groups:
  - name: outer
    steps:
      - name: login
        request: { url: "http://x/token" }
        capture: { token: $.token }
    groups:
      - name: inner
        parallel: true
        steps:
          - name: me
            request:
              url: http://x/me
              headers:
                Authorization: "Bearer {{token}}"
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();
    assert!(results[0].is_passed());
    let me = mock.calls().into_iter().find(|r| r.url == "http://x/me").unwrap();
    assert_eq!(me.headers.get("Authorization").map(String::as_str), Some("Bearer t-1"));
}

#[tokio::test]
async fn sequential_repeat_binds_iteration_variables() {
    let mock = Arc::new(MockTransport::new());
    let wf = workflow(
        r#"
name: repeat
steps:
  - name: page
    request:
      url: "http://x/page/{{index}}?user={{user}}"
    repeat:
      count: 3
      variables:
        user: "u{{iteration}}"
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();

    assert_eq!(
        mock.urls(),
        vec![
            "http://x/page/0?user=u1",
            "http://x/page/1?user=u2",
            "http://x/page/2?user=u3",
        ]
    );
    let parent = &results[0];
    assert_eq!(parent.status, StepStatus::Passed);
    assert_eq!(parent.children.len(), 3);
    assert!(parent.children.iter().all(|c| c.kind == ResultKind::Iteration));
    assert_eq!(parent.children[2].name, "page[3]");
}

#[tokio::test(start_paused = true)]
async fn parallel_repeat_fails_if_any_iteration_fails() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/n/1", Route::ok("{}").delayed(Duration::from_millis(50)))
            .route("http://x/n/2", Route::status(503, "").delayed(Duration::from_millis(10)))
            .route("http://x/n/3", Route::ok("{}")),
    );
    let wf = workflow(
        r#"
name: repeat-parallel
steps:
  - name: n
    request: { url: "http://x/n/{{iteration}}" }
    validate: [{ type: status_code, expected: 200 }]
    repeat: { count: 3, parallel: true }
"#,
    );

    let results = executor(&mock).execute(&wf).await.unwrap();
    let parent = &results[0];
    assert_eq!(parent.status, StepStatus::Failed);
    let statuses: Vec<_> = parent.children.iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Passed]);
    assert_eq!(parent.error.as_deref(), Some("failed: n[2]"));
}

#[tokio::test]
async fn global_captures_apply_to_every_passed_step() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/a", Route::ok(r#"{"id": 1}"#).header("X-Request-Id", "r-a"))
            .route("http://x/b", Route::ok("plain text").header("X-Request-Id", "r-b")),
    );
    let wf = workflow(
        r#"
name: global
captures:
  last_request: $headers.X-Request-Id
  last_id: $.id
steps:
  - name: a
    request: { url: "http://x/a" }
  - name: b
    request: { url: "http://x/b" }
"#,
    );

    let (_, store) = executor(&mock)
        .execute_with_store(&wf, apiflow_core::VariableStore::new())
        .await
        .unwrap();
    assert_eq!(store.get("last_request"), Some(&json!("r-b")));
    // b's body is not JSON, so the earlier value survives.
    assert_eq!(store.get("last_id"), Some(&json!(1)));
}

#[tokio::test]
async fn capture_miss_does_not_fail_the_step() {
    let mock = Arc::new(MockTransport::new().route("http://x/a", Route::ok(r#"{"id": 1}"#)));
    let wf = workflow(
        "name: miss\nsteps:\n  - name: a\n    request: { url: \"http://x/a\" }\n    capture: { nope: $.missing }\n",
    );
    let results = executor(&mock).execute(&wf).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Passed);
    assert!(results[0].captured.is_empty());
}

#[tokio::test]
async fn undefined_variable_fails_substitution_without_dispatch() {
    let mock = Arc::new(MockTransport::new());
    let wf = workflow("name: undef\nsteps:\n  - name: a\n    request: { url: \"http://x/{{nope}}\" }\n");
    let results = executor(&mock).execute(&wf).await.unwrap();
    assert!(mock.calls().is_empty());
    assert_eq!(results[0].status, StepStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("nope"));
}

#[tokio::test]
async fn grpc_without_a_registered_transport_is_unsupported() {
    let mock = Arc::new(MockTransport::new());
    let wf = workflow(
        r#"
name: grpc
steps:
  - name: call
    request:
      protocol: grpc
      service: users.Users
      grpc_method: Get
      server_addr: localhost:50051
"#,
    );
    let results = executor(&mock).execute(&wf).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("grpc"));
    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn step_timeout_bounds_the_transport_call() {
    let mock = Arc::new(
        MockTransport::new().route("http://x/slow", Route::ok("{}").delayed(Duration::from_secs(5))),
    );
    let wf = workflow("name: t\nsteps:\n  - name: slow\n    timeout: 100ms\n    request: { url: \"http://x/slow\" }\n");
    let results = executor(&mock).execute(&wf).await.unwrap();
    assert_eq!(results[0].status, StepStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("timeout"));
}
