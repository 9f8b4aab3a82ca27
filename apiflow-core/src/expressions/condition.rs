//! Condition evaluation for steps and groups.
//!
//! Supported shapes, evaluated against a [`VariableStore`]:
//! - truthiness: `{{flag}}`, `flag`, `!{{flag}}`
//! - comparison: `{{status}} == active`, `{{count}} >= 3`
//! - combination: `a && b`, `a || b` (`&&` binds tighter)
//!
//! Empty strings, `0`, `false`, `null` and unresolved references are falsy.

use crate::expressions::template::contains_placeholder;
use crate::variables::{value_to_string, VariableStore};

const COMPARISON_OPS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

pub fn evaluate_condition(expression: &str, store: &VariableStore) -> bool {
    let expr = expression.trim();
    if expr.is_empty() {
        return true;
    }
    if let Some(parts) = split_top_level(expr, "||") {
        return parts.iter().any(|p| evaluate_condition(p, store));
    }
    if let Some(parts) = split_top_level(expr, "&&") {
        return parts.iter().all(|p| evaluate_condition(p, store));
    }
    if let Some(inner) = expr.strip_prefix('!') {
        if !inner.starts_with('=') {
            return !evaluate_condition(inner, store);
        }
    }
    if let Some((lhs, op, rhs)) = find_comparison(expr) {
        let left = resolve_operand(lhs, store);
        let right = resolve_operand(rhs, store);
        return compare(left.as_deref(), op, right.as_deref());
    }
    resolve_truthy_operand(expr, store).is_some_and(|v| is_truthy(&v))
}

pub fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    !(v.is_empty()
        || v == "0"
        || v.eq_ignore_ascii_case("false")
        || v.eq_ignore_ascii_case("null"))
}

/// Splits on `sep` outside of placeholders and quotes; `None` when `sep` is absent.
fn split_top_level<'a>(expr: &'a str, sep: &str) -> Option<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if expr[i..].starts_with("{{") => {
                depth += 1;
                i += 2;
                continue;
            }
            None if expr[i..].starts_with("}}") && depth > 0 => {
                depth -= 1;
                i += 2;
                continue;
            }
            None if depth == 0 && expr[i..].starts_with(sep) => {
                parts.push(&expr[start..i]);
                i += sep.len();
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    if parts.is_empty() {
        return None;
    }
    parts.push(&expr[start..]);
    Some(parts)
}

fn find_comparison(expr: &str) -> Option<(&str, &'static str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if expr[i..].starts_with("{{") => {
                depth += 1;
                i += 2;
                continue;
            }
            None if expr[i..].starts_with("}}") && depth > 0 => {
                depth -= 1;
                i += 2;
                continue;
            }
            None if depth == 0 => {
                for op in COMPARISON_OPS {
                    if expr[i..].starts_with(op) {
                        return Some((&expr[..i], op, &expr[i + op.len()..]));
                    }
                }
            }
            None => {}
        }
        i += 1;
    }
    None
}

/// Operand for comparisons: placeholders are substituted, bare identifiers naming a
/// variable are looked up, anything else is a literal.
fn resolve_operand(raw: &str, store: &VariableStore) -> Option<String> {
    let raw = raw.trim();
    if contains_placeholder(raw) {
        let s = store.substitute_lenient(raw);
        if contains_placeholder(&s) {
            return None;
        }
        return Some(unquote(&s).to_string());
    }
    if is_identifier(raw) {
        if let Some(v) = store.lookup_path(raw) {
            return Some(value_to_string(&v));
        }
    }
    Some(unquote(raw).to_string())
}

/// Operand for truthiness: an unknown bare identifier counts as unset.
fn resolve_truthy_operand(raw: &str, store: &VariableStore) -> Option<String> {
    let raw = raw.trim();
    if contains_placeholder(raw) {
        return resolve_operand(raw, store);
    }
    if is_identifier(raw) {
        if let Some(v) = store.lookup_path(raw) {
            return Some(value_to_string(&v));
        }
        let lower = raw.to_ascii_lowercase();
        return matches!(lower.as_str(), "true" | "false").then_some(lower);
    }
    Some(unquote(raw).to_string())
}

fn compare(left: Option<&str>, op: &str, right: Option<&str>) -> bool {
    let (Some(l), Some(r)) = (left, right) else {
        // An unset side only equals another unset side.
        return match op {
            "==" => left.is_none() && right.is_none(),
            "!=" => left.is_some() || right.is_some(),
            _ => false,
        };
    };
    if let (Ok(a), Ok(b)) = (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
        return match op {
            "==" => a == b,
            "!=" => a != b,
            ">=" => a >= b,
            "<=" => a <= b,
            ">" => a > b,
            "<" => a < b,
            _ => false,
        };
    }
    match op {
        "==" => l == r,
        "!=" => l != r,
        ">=" => l >= r,
        "<=" => l <= r,
        ">" => l > r,
        "<" => l < r,
        _ => false,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '-'))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return &s[1..s.len() - 1];
    }
    s
}
