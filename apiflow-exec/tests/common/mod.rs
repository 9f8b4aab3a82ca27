#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apiflow_core::types::{Protocol, Workflow};
use apiflow_exec::{ResolvedRequest, Transport, TransportError, TransportRegistry, TransportResponse};
use async_trait::async_trait;

#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub delay: Duration,
    pub fail: Option<TransportError>,
}

impl Route {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: BTreeMap::new(),
            delay: Duration::ZERO,
            fail: None,
        }
    }

    pub fn failing(err: TransportError) -> Self {
        Self {
            fail: Some(err),
            ..Self::status(0, "")
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// Answers by exact URL; unknown URLs get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: BTreeMap<String, Route>,
    calls: Mutex<Vec<ResolvedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn calls(&self) -> Vec<ResolvedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.url).collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: &ResolvedRequest, _timeout: Duration) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(req.clone());
        let route = self
            .routes
            .get(&req.url)
            .cloned()
            .unwrap_or_else(|| Route::status(404, "not found"));
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        if let Some(err) = route.fail {
            return Err(err);
        }
        Ok(TransportResponse {
            status: route.status,
            headers: route.headers,
            body: route.body.into_bytes(),
            duration: route.delay,
        })
    }
}

pub fn registry(mock: Arc<MockTransport>) -> TransportRegistry {
    TransportRegistry::empty().with(Protocol::Http, mock)
}

pub fn workflow(yaml: &str) -> Workflow {
    serde_yaml::from_str(yaml).unwrap()
}
