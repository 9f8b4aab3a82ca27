use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use apiflow_core::types::{ApiKeyLocation, AuthType};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{ResolvedRequest, Transport, TransportError, TransportResponse};

pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestHttpTransport {
    pub fn new(max_response_bytes: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("apiflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(client, max_response_bytes))
    }

    pub fn with_client(client: reqwest::Client, max_response_bytes: usize) -> Self {
        Self {
            client,
            max_response_bytes,
        }
    }

    fn build(&self, req: &ResolvedRequest, timeout: Duration) -> Result<reqwest::RequestBuilder, TransportError> {
        let method: reqwest::Method = req
            .method
            .to_ascii_uppercase()
            .parse()
            .map_err(|e: <reqwest::Method as std::str::FromStr>::Err| {
                TransportError::InvalidRequest(e.to_string())
            })?;

        let mut url = url::Url::parse(&req.url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {e}", req.url)))?;
        let mut query: Vec<(String, String)> = req
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(auth) = &req.auth {
            if auth.r#type == AuthType::ApiKey && auth.location == ApiKeyLocation::Query {
                if let (Some(k), Some(v)) = (&auth.key, &auth.value) {
                    query.push((k.clone(), v.clone()));
                }
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut rb = self.client.request(method, url).timeout(timeout);
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }

        if let Some(auth) = &req.auth {
            rb = match auth.r#type {
                AuthType::Bearer => rb.bearer_auth(auth.token.as_deref().unwrap_or_default()),
                AuthType::Basic => rb.basic_auth(
                    auth.username.as_deref().unwrap_or_default(),
                    auth.password.as_deref(),
                ),
                AuthType::ApiKey => match (auth.location, &auth.key, &auth.value) {
                    (ApiKeyLocation::Header, Some(k), Some(v)) => rb.header(k.as_str(), v.as_str()),
                    _ => rb,
                },
            };
        }

        rb = match &req.body {
            None | Some(JsonValue::Null) => rb,
            Some(JsonValue::String(text)) => rb.body(text.clone()),
            Some(body) => rb.json(body),
        };
        Ok(rb)
    }
}

#[async_trait]
impl Transport for ReqwestHttpTransport {
    async fn send(
        &self,
        req: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let rb = self.build(req, timeout)?;
        let started = Instant::now();
        let resp = rb.send().await.map_err(|e| map_reqwest_error(e, timeout))?;
        let status = resp.status().as_u16();

        if let Some(len) = resp.content_length() {
            if len > self.max_response_bytes as u64 {
                return Err(TransportError::ResponseTooLarge {
                    max_bytes: self.max_response_bytes,
                });
            }
        }

        let headers = collect_headers(resp.headers());
        let body = resp.bytes().await.map_err(|e| map_reqwest_error(e, timeout))?;
        if body.len() > self.max_response_bytes {
            return Err(TransportError::ResponseTooLarge {
                max_bytes: self.max_response_bytes,
            });
        }

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
            duration: started.elapsed(),
        })
    }
}

/// Repeated headers such as `Set-Cookie` are joined with `, `. Values that
/// are not visible ASCII are skipped.
fn collect_headers(map: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in map {
        let Ok(s) = v.to_str() else { continue };
        headers
            .entry(k.to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(s);
            })
            .or_insert_with(|| s.to_string());
    }
    headers
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout(timeout);
    }
    if e.is_connect() || e.is_request() {
        return TransportError::Network(e.to_string());
    }
    if e.is_builder() {
        return TransportError::InvalidRequest(e.to_string());
    }
    TransportError::Other(e.to_string())
}
