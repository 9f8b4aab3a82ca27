use std::collections::BTreeMap;
use std::time::Duration;

use apiflow_core::expressions::query_path;
use apiflow_core::types::{parse_duration, Operator, Validation, ValidationType};
use apiflow_core::variables::value_to_string;
use apiflow_core::VariableStore;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::executor::result::ValidationResult;

/// The response parts rules look at.
pub struct ResponseView<'a> {
    pub status: u16,
    pub headers: &'a BTreeMap<String, String>,
    pub body: &'a str,
    pub json: Option<&'a JsonValue>,
    pub elapsed: Duration,
}

/// Evaluates every rule. Expected values are substituted against `store`.
pub fn evaluate_rules(
    rules: &[Validation],
    resp: &ResponseView<'_>,
    store: &VariableStore,
) -> Vec<ValidationResult> {
    rules.iter().map(|r| evaluate_rule(r, resp, store)).collect()
}

pub fn all_passed(results: &[ValidationResult]) -> bool {
    results.iter().all(|r| r.passed)
}

fn evaluate_rule(rule: &Validation, resp: &ResponseView<'_>, store: &VariableStore) -> ValidationResult {
    let label = rule.describe();
    let expected = match rule.expected.as_ref().map(|e| store.substitute_value(e)).transpose() {
        Ok(e) => e,
        Err(e) => {
            return ValidationResult {
                rule: label,
                passed: false,
                actual: None,
                message: format!("expected value: {e}"),
            }
        }
    };

    let actual = match actual_value(rule, resp) {
        Ok(v) => v,
        Err(message) => {
            return ValidationResult {
                rule: label,
                passed: false,
                actual: None,
                message,
            }
        }
    };

    let op = rule.effective_operator();
    let expected = match (rule.r#type, expected) {
        (ValidationType::ResponseTime, Some(e)) => Some(as_millis(&e)),
        (_, e) => e,
    };
    let passed = compare_values(actual.as_ref(), expected.as_ref(), op);
    let message = if passed {
        "ok".to_string()
    } else {
        format!(
            "expected {} {}, got {}",
            op.as_str(),
            expected.as_ref().map(value_to_string).unwrap_or_else(|| "-".into()),
            actual
                .as_ref()
                .map(value_to_string)
                .unwrap_or_else(|| "nothing".into())
        )
    };
    ValidationResult {
        rule: label,
        passed,
        actual,
        message,
    }
}

/// `Ok(None)` means the subject is absent (a header or path that matched nothing).
fn actual_value(rule: &Validation, resp: &ResponseView<'_>) -> Result<Option<JsonValue>, String> {
    match rule.r#type {
        ValidationType::StatusCode => Ok(Some(JsonValue::from(resp.status))),
        ValidationType::ResponseTime => Ok(Some(JsonValue::from(resp.elapsed.as_millis() as u64))),
        ValidationType::Header => {
            let name = rule.name.as_deref().unwrap_or_default();
            Ok(resp
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| JsonValue::String(v.clone())))
        }
        ValidationType::JsonPath => json_subject(rule.path.as_deref().unwrap_or("$"), resp),
        ValidationType::BodyContains | ValidationType::Regex => match rule.path.as_deref() {
            Some(path) => json_subject(path, resp),
            None => Ok(Some(JsonValue::String(resp.body.to_string()))),
        },
    }
}

fn json_subject(path: &str, resp: &ResponseView<'_>) -> Result<Option<JsonValue>, String> {
    let json = resp.json.ok_or_else(|| "response body is not JSON".to_string())?;
    query_path(json, path)
        .map(|m| m.into_value())
        .map_err(|e| e.to_string())
}

fn as_millis(v: &JsonValue) -> JsonValue {
    match v {
        JsonValue::String(s) => parse_duration(s)
            .map(|d| JsonValue::from(d.as_millis() as u64))
            .unwrap_or_else(|| v.clone()),
        other => other.clone(),
    }
}

pub(crate) fn parse_literal(s: &str) -> JsonValue {
    let s = s.trim();

    if let Ok(v) = serde_json::from_str::<JsonValue>(s) {
        return v;
    }

    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return JsonValue::String(s[1..s.len() - 1].to_string());
    }

    JsonValue::String(s.to_string())
}

pub(crate) fn compare_values(actual: Option<&JsonValue>, expected: Option<&JsonValue>, op: Operator) -> bool {
    match op {
        Operator::Exists => return actual.is_some_and(|a| !a.is_null()),
        Operator::NotExists => return actual.map_or(true, JsonValue::is_null),
        _ => {}
    }
    let Some(actual) = actual else {
        return false;
    };
    let null = JsonValue::Null;
    let expected = expected.unwrap_or(&null);
    match op {
        Operator::Eq => json_eq(actual, expected),
        Operator::Ne => !json_eq(actual, expected),
        Operator::Lt => json_cmp(actual, expected).is_some_and(|o| o.is_lt()),
        Operator::Le => json_cmp(actual, expected).is_some_and(|o| o.is_le()),
        Operator::Gt => json_cmp(actual, expected).is_some_and(|o| o.is_gt()),
        Operator::Ge => json_cmp(actual, expected).is_some_and(|o| o.is_ge()),
        Operator::Contains => contains(actual, expected),
        Operator::NotContains => !contains(actual, expected),
        Operator::Matches => {
            let pattern = value_to_string(expected);
            Regex::new(&pattern)
                .map(|re| re.is_match(&value_to_string(actual)))
                .unwrap_or(false)
        }
        Operator::Exists | Operator::NotExists => false,
    }
}

fn contains(actual: &JsonValue, expected: &JsonValue) -> bool {
    match actual {
        JsonValue::Array(items) => items.iter().any(|i| json_eq(i, expected)),
        JsonValue::Object(map) => map.contains_key(&value_to_string(expected)),
        other => value_to_string(other).contains(&value_to_string(expected)),
    }
}

/// Structural equality; a string and a scalar compare by their text, so
/// `"200"` equals `200`.
pub(crate) fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|bv| json_eq(v, bv)).unwrap_or(false))
        }
        (JsonValue::String(s), other @ (JsonValue::Number(_) | JsonValue::Bool(_)))
        | (other @ (JsonValue::Number(_) | JsonValue::Bool(_)), JsonValue::String(s)) => {
            json_eq(&parse_literal(s), other)
        }
        _ => false,
    }
}

pub(crate) fn json_cmp(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    let num = |v: &JsonValue| match v {
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    };
    match (num(a), num(b)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    }
}
