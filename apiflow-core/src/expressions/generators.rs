//! Synthetic data for `{{generator.*}}` placeholders.
//!
//! Each call produces a fresh value, so a request that is substituted once per
//! dispatch (repeats, load tests) sees different data every time.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value as JsonValue;

use crate::error::TemplateError;

pub const GENERATOR_PREFIX: &str = "generator.";

/// Evaluates a generator call such as `uuid` or `random_int(1, 10)`.
pub fn generate(call: &str) -> Result<JsonValue, TemplateError> {
    let (name, args) = split_call(call)?;
    match name {
        "uuid" => Ok(JsonValue::String(uuid::Uuid::new_v4().to_string())),
        "timestamp" => Ok(JsonValue::from(unix_now().as_secs())),
        "timestamp_ms" => Ok(JsonValue::from(unix_now().as_millis() as u64)),
        "datetime" => Ok(JsonValue::String(chrono::Utc::now().to_rfc3339())),
        "random_int" => {
            let (min, max) = match args.as_slice() {
                [] => (0, 1000),
                [max] => (0, parse_int(name, max)?),
                [min, max] => (parse_int(name, min)?, parse_int(name, max)?),
                _ => return Err(invalid(name, "expected at most two arguments")),
            };
            if min > max {
                return Err(invalid(name, "min must not exceed max"));
            }
            Ok(JsonValue::from(fastrand::i64(min..=max)))
        }
        "random_string" => {
            let len = match args.as_slice() {
                [] => 10,
                [len] => parse_int(name, len)?.max(0) as usize,
                _ => return Err(invalid(name, "expected at most one argument")),
            };
            Ok(JsonValue::String(random_alphanumeric(len)))
        }
        "random_email" => Ok(JsonValue::String(format!(
            "{}@example.com",
            random_alphanumeric(10).to_ascii_lowercase()
        ))),
        "random_bool" => Ok(JsonValue::Bool(fastrand::bool())),
        other => Err(invalid(other, "unknown generator")),
    }
}

fn split_call(call: &str) -> Result<(&str, Vec<&str>), TemplateError> {
    let call = call.trim();
    let Some(open) = call.find('(') else {
        return Ok((call, Vec::new()));
    };
    let name = call[..open].trim();
    let inner = call[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| invalid(name, "missing closing parenthesis"))?;
    let args = inner
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    Ok((name, args))
}

fn parse_int(name: &str, arg: &str) -> Result<i64, TemplateError> {
    arg.parse::<i64>()
        .map_err(|_| invalid(name, &format!("argument {arg:?} is not an integer")))
}

fn invalid(name: &str, reason: &str) -> TemplateError {
    TemplateError::InvalidGenerator {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn unix_now() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn random_alphanumeric(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(len)
        .collect()
}
