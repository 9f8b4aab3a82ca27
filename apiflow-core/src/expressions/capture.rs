use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::expressions::path::query_path;
use crate::types::Captures;
use crate::variables::VariableStore;

/// The parts of a response a capture path can address.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSource<'a> {
    pub status: u16,
    pub headers: &'a BTreeMap<String, String>,
    pub body: &'a str,
    pub json: Option<&'a JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMiss {
    pub name: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutcome {
    pub captured: BTreeMap<String, JsonValue>,
    pub misses: Vec<CaptureMiss>,
}

/// Extracts every `name -> path` pair from `source` and binds hits into `store`.
///
/// Besides JSONPath, `$status`, `$body` and `$headers.<name>` address the status
/// code, the raw body text and a response header. Misses never fail the caller.
pub fn capture(source: &CaptureSource<'_>, captures: &Captures, store: &mut VariableStore) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();
    for (name, path) in captures {
        match extract(source, path) {
            Ok(v) => {
                store.set(name.clone(), v.clone());
                outcome.captured.insert(name.clone(), v);
            }
            Err(reason) => outcome.misses.push(CaptureMiss {
                name: name.clone(),
                path: path.clone(),
                reason,
            }),
        }
    }
    outcome
}

pub fn extract(source: &CaptureSource<'_>, path: &str) -> Result<JsonValue, String> {
    let path = path.trim();
    if path == "$status" || path == "$status_code" {
        return Ok(JsonValue::from(source.status));
    }
    if path == "$body" {
        return Ok(JsonValue::String(source.body.to_string()));
    }
    if let Some(header) = path.strip_prefix("$headers.") {
        return source
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(header))
            .map(|(_, v)| JsonValue::String(v.clone()))
            .ok_or_else(|| format!("header {header} not present"));
    }
    let json = source
        .json
        .ok_or_else(|| "response body is not JSON".to_string())?;
    query_path(json, path)
        .map_err(|e| e.to_string())?
        .into_value()
        .ok_or_else(|| "path matched nothing".to_string())
}
