mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use apiflow_exec::executor::concurrency::ConcurrencyLimits;
use apiflow_exec::{Executor, ExecutorConfig, StepStatus};

use common::{registry, workflow, MockTransport, Route};

#[tokio::test]
async fn global_limit_blocks_until_a_permit_is_released() {
    let limits = ConcurrencyLimits::new(2, &BTreeMap::new());

    let permit1 = limits.acquire(None).await.unwrap();
    let _permit2 = limits.acquire(None).await.unwrap();
    assert_eq!(limits.available(), 0);

    let start = std::time::Instant::now();
    let waiter = {
        let limits = limits.clone();
        tokio::spawn(async move { limits.acquire(None).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(permit1);
    waiter.await.unwrap().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn per_protocol_limit_applies_only_to_that_protocol() {
    let mut per_protocol = BTreeMap::new();
    per_protocol.insert("grpc".to_string(), 1);
    let limits = ConcurrencyLimits::new(10, &per_protocol);

    let grpc = limits.acquire(Some("grpc")).await.unwrap();
    let _http1 = limits.acquire(Some("http")).await.unwrap();
    let _http2 = limits.acquire(Some("http")).await.unwrap();

    let blocked = tokio::time::timeout(Duration::from_millis(20), limits.acquire(Some("grpc"))).await;
    assert!(blocked.is_err());

    drop(grpc);
    let again = tokio::time::timeout(Duration::from_millis(20), limits.acquire(Some("grpc"))).await;
    assert!(again.is_ok());
}

#[tokio::test(start_paused = true)]
async fn max_parallel_serializes_a_parallel_group() {
    let mock = Arc::new(
        MockTransport::new()
            .route("http://x/1", Route::ok("{}").delayed(Duration::from_millis(100)))
            .route("http://x/2", Route::ok("{}").delayed(Duration::from_millis(100)))
            .route("http://x/3", Route::ok("{}").delayed(Duration::from_millis(100))),
    );
    let config = ExecutorConfig {
        max_parallel: 1,
        ..ExecutorConfig::default()
    };
    let exec = Executor::new(config).with_transports(registry(mock.clone()));
    let wf = workflow(
        r#"
name: bounded
groups:
  - name: all
    parallel: true
    steps:
      - { name: one, request: { url: "http://x/1" } }
      - { name: two, request: { url: "http://x/2" } }
      - { name: three, request: { url: "http://x/3" } }
"#,
    );

    let start = tokio::time::Instant::now();
    let results = exec.execute(&wf).await.unwrap();

    assert_eq!(results[0].status, StepStatus::Passed);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(mock.calls().len(), 3);
}
