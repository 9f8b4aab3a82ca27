use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

#[derive(Debug, Clone, PartialEq)]
pub enum PathMatch {
    None,
    One(JsonValue),
    Many(Vec<JsonValue>),
}

impl PathMatch {
    pub fn into_value(self) -> Option<JsonValue> {
        match self {
            PathMatch::None => None,
            PathMatch::One(v) => Some(v),
            PathMatch::Many(v) => Some(JsonValue::Array(v)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PathMatch::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path expression {path:?}: {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

/// Accepts `$.a.b`, `a.b` and `$` alike.
///
/// Nothing else is rewritten: expressions are RFC 9535 JSONPath, so string
/// literals in filters must be quoted (`[?@.status=='open']`). An unquoted
/// literal such as `[?(@.status==open)]` fails to parse, and captures report
/// it as a miss.
pub fn normalize_path(path: &str) -> String {
    let p = path.trim();
    if p.starts_with('$') {
        p.to_string()
    } else if p.starts_with('[') {
        format!("${p}")
    } else {
        format!("$.{p}")
    }
}

/// True when `path` can select at most one node (no wildcard, descendant, slice or filter).
pub fn is_singular_path(path: &str) -> bool {
    if path.contains("..") || path.contains('*') {
        return false;
    }
    let mut in_brackets = false;
    let mut quote: Option<char> = None;
    for ch in path.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[') => in_brackets = true,
            (None, ']') => in_brackets = false,
            (None, '?' | ':' | ',') if in_brackets => return false,
            _ => {}
        }
    }
    true
}

/// Evaluates a JSONPath expression against `root`.
///
/// Singular paths yield [`PathMatch::One`]; slices, filters and wildcards yield
/// [`PathMatch::Many`] even when only one node matched.
pub fn query_path(root: &JsonValue, path: &str) -> Result<PathMatch, PathError> {
    let normalized = normalize_path(path);
    let jsonpath = JsonPath::parse(&normalized).map_err(|e| PathError {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let nodes: Vec<&JsonValue> = jsonpath.query(root).all();
    if nodes.is_empty() {
        return Ok(PathMatch::None);
    }
    if is_singular_path(&normalized) {
        return Ok(PathMatch::One(nodes[0].clone()));
    }
    Ok(PathMatch::Many(nodes.into_iter().cloned().collect()))
}
