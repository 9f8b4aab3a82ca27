//! Protocol transports consumed by the executor and the load engine.

mod http;
mod registry;
mod request;

use std::collections::BTreeMap;
use std::time::Duration;

use apiflow_core::types::{Auth, Protocol};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

pub use http::ReqwestHttpTransport;
pub use registry::{TransportFactory, TransportRegistry};
pub use request::resolve_request;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("response too large (>{max_bytes} bytes)")]
    ResponseTooLarge { max_bytes: usize },
    #[error("no transport registered for protocol {0}")]
    UnsupportedProtocol(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// A request with every template placeholder substituted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedRequest {
    pub protocol: Protocol,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<JsonValue>,
    pub auth: Option<Auth>,
    pub service: Option<String>,
    pub grpc_method: Option<String>,
    pub server_addr: Option<String>,
    pub insecure: bool,
    pub data: Option<JsonValue>,
    pub metadata: BTreeMap<String, String>,
}

impl ResolvedRequest {
    pub fn describe(&self) -> String {
        match self.protocol {
            Protocol::Http => format!("{} {}", self.method, self.url),
            _ => format!(
                "{} {}/{}",
                self.protocol,
                self.service.as_deref().unwrap_or(""),
                self.grpc_method.as_deref().unwrap_or("")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub duration: Duration,
}

impl TransportResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<JsonValue> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        req: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}
