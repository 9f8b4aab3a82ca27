//! Run-scoped variable store and `{{expr}}` substitution.
//!
//! One store belongs to one run. It is cloned, never shared, when work fans out
//! to concurrent tasks; see the executor for how task-local captures are merged
//! back after the join.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::TemplateError;
use crate::expressions::generators::{generate, GENERATOR_PREFIX};
use crate::expressions::template::{parse_template, Segment};
use crate::types::{Variables, Workflow};

const ENV_PREFIX: &str = "env.";

/// Passes used to resolve variables whose values reference other variables.
const DECLARATION_PASSES: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: BTreeMap<String, JsonValue>,
    env: Arc<BTreeMap<String, String>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(env: BTreeMap<String, String>) -> Self {
        Self {
            values: BTreeMap::new(),
            env: Arc::new(env),
        }
    }

    /// Store seeded with a workflow's declared variables and load-time environment.
    ///
    /// Declarations may reference each other (`api: "{{base}}/v1"`); those references
    /// are resolved best-effort in declaration order.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut store = Self::with_environment(workflow.environment.clone());
        store.declare(&workflow.variables);
        store
    }

    pub fn declare(&mut self, vars: &Variables) {
        self.extend(vars.clone());
        for _ in 0..DECLARATION_PASSES {
            let mut changed = false;
            for name in vars.keys() {
                let Some(current) = self.values.get(name).cloned() else {
                    continue;
                };
                let next = self.substitute_value_lenient(&current);
                if next != current {
                    self.values.insert(name.clone(), next);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: JsonValue) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        self.values.remove(name)
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = (String, JsonValue)>) {
        self.values.extend(values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &BTreeMap<String, JsonValue> {
        &self.values
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Resolves one placeholder expression. `Ok(None)` means undefined.
    pub fn resolve(&self, expr: &str) -> Result<Option<JsonValue>, TemplateError> {
        let expr = expr.trim();
        if let Some(call) = expr.strip_prefix(GENERATOR_PREFIX) {
            return generate(call).map(Some);
        }
        if let Some(name) = expr.strip_prefix(ENV_PREFIX) {
            if !self.values.contains_key("env") {
                return Ok(self.env(name).map(|v| JsonValue::String(v.to_string())));
            }
        }
        if let Some(v) = self.lookup_path(expr) {
            return Ok(Some(v));
        }
        Ok(self.env(expr).map(|v| JsonValue::String(v.to_string())))
    }

    /// `name`, `name.field`, `name[0].field` lookups into stored values.
    pub fn lookup_path(&self, expr: &str) -> Option<JsonValue> {
        if let Some(v) = self.values.get(expr) {
            return Some(v.clone());
        }
        let (root, accessors) = split_accessors(expr)?;
        let mut cur = self.values.get(root)?;
        for accessor in accessors {
            cur = match accessor {
                Accessor::Field(f) => cur.get(f)?,
                Accessor::Index(i) => {
                    let arr = cur.as_array()?;
                    let idx = if i < 0 { arr.len() as i64 + i } else { i };
                    arr.get(usize::try_from(idx).ok()?)?
                }
            };
        }
        Some(cur.clone())
    }

    /// Strict substitution: any undefined reference fails.
    pub fn substitute(&self, template: &str) -> Result<String, TemplateError> {
        let tpl = parse_template(template)?;
        let mut out = String::with_capacity(template.len());
        for seg in tpl.segments {
            match seg {
                Segment::Literal(l) => out.push_str(&l),
                Segment::Expr(e) => {
                    let v = self
                        .resolve(&e)?
                        .ok_or_else(|| TemplateError::UndefinedVariable(e.clone()))?;
                    out.push_str(&value_to_string(&v));
                }
            }
        }
        Ok(out)
    }

    /// Best-effort substitution: unresolved placeholders are kept as written.
    pub fn substitute_lenient(&self, template: &str) -> String {
        let Ok(tpl) = parse_template(template) else {
            return template.to_string();
        };
        let mut out = String::with_capacity(template.len());
        for seg in tpl.segments {
            match seg {
                Segment::Literal(l) => out.push_str(&l),
                Segment::Expr(e) => match self.resolve(&e) {
                    Ok(Some(v)) => out.push_str(&value_to_string(&v)),
                    _ => {
                        out.push_str("{{");
                        out.push_str(&e);
                        out.push_str("}}");
                    }
                },
            }
        }
        out
    }

    /// Strictly substitutes every string leaf of `value`.
    ///
    /// A string that is exactly one placeholder takes the referenced value's type.
    pub fn substitute_value(&self, value: &JsonValue) -> Result<JsonValue, TemplateError> {
        match value {
            JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => Ok(value.clone()),
            JsonValue::String(s) => {
                let tpl = parse_template(s)?;
                if let Some(expr) = tpl.single_expr() {
                    return self
                        .resolve(expr)?
                        .ok_or_else(|| TemplateError::UndefinedVariable(expr.to_string()));
                }
                Ok(JsonValue::String(self.substitute(s)?))
            }
            JsonValue::Array(arr) => arr
                .iter()
                .map(|v| self.substitute_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            JsonValue::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.substitute_value(v)?);
                }
                Ok(JsonValue::Object(out))
            }
        }
    }

    pub fn substitute_value_lenient(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => {
                if let Ok(tpl) = parse_template(s) {
                    if let Some(expr) = tpl.single_expr() {
                        if let Ok(Some(v)) = self.resolve(expr) {
                            return v;
                        }
                    }
                }
                JsonValue::String(self.substitute_lenient(s))
            }
            JsonValue::Array(arr) => {
                JsonValue::Array(arr.iter().map(|v| self.substitute_value_lenient(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_value_lenient(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Binds only placeholders that name stored values. Generators and environment
    /// references are left for run time.
    pub fn substitute_known_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => {
                let Ok(tpl) = parse_template(s) else {
                    return value.clone();
                };
                if let Some(v) = tpl.single_expr().and_then(|e| self.lookup_path(e.trim())) {
                    return v;
                }
                let mut out = String::with_capacity(s.len());
                for seg in tpl.segments {
                    match seg {
                        Segment::Literal(l) => out.push_str(&l),
                        Segment::Expr(e) => match self.lookup_path(e.trim()) {
                            Some(v) => out.push_str(&value_to_string(&v)),
                            None => {
                                out.push_str("{{");
                                out.push_str(&e);
                                out.push_str("}}");
                            }
                        },
                    }
                }
                JsonValue::String(out)
            }
            JsonValue::Array(arr) => {
                JsonValue::Array(arr.iter().map(|v| self.substitute_known_value(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_known_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Strictly substitutes each value of a string-keyed map.
    pub fn substitute_map(
        &self,
        map: &BTreeMap<String, JsonValue>,
    ) -> Result<BTreeMap<String, JsonValue>, TemplateError> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.substitute_value(v)?)))
            .collect()
    }
}

/// Renders a value for string positions (URLs, headers, text).
pub fn value_to_string(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

enum Accessor<'a> {
    Field(&'a str),
    Index(i64),
}

fn split_accessors(expr: &str) -> Option<(&str, Vec<Accessor<'_>>)> {
    let root_end = expr.find(['.', '[']).unwrap_or(expr.len());
    let root = &expr[..root_end];
    if root.is_empty() {
        return None;
    }
    let mut accessors = Vec::new();
    let mut rest = &expr[root_end..];
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            accessors.push(Accessor::Field(&after[..end]));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            let inner = after[..end].trim().trim_matches(|c| c == '\'' || c == '"');
            match inner.parse::<i64>() {
                Ok(i) => accessors.push(Accessor::Index(i)),
                Err(_) => accessors.push(Accessor::Field(inner)),
            }
            rest = &after[end + 1..];
        } else {
            return None;
        }
    }
    Some((root, accessors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> VariableStore {
        let mut env = BTreeMap::new();
        env.insert("HOME_REGION".to_string(), "eu-west-1".to_string());
        let mut s = VariableStore::with_environment(env);
        s.set("base", json!("http://x"));
        s.set("id", json!(7));
        s.set("user", json!({"name": "ada", "roles": ["admin", "dev"]}));
        s
    }

    #[test]
    fn strict_substitution_formats_values() {
        let s = store();
        assert_eq!(s.substitute("{{base}}/item/{{id}}").unwrap(), "http://x/item/7");
    }

    #[test]
    fn strict_substitution_rejects_undefined() {
        let err = store().substitute("{{base}}/{{missing}}").unwrap_err();
        assert_eq!(err, TemplateError::UndefinedVariable("missing".into()));
    }

    #[test]
    fn lenient_substitution_keeps_unknown_placeholders() {
        assert_eq!(store().substitute_lenient("{{base}}/{{missing}}"), "http://x/{{missing}}");
    }

    #[test]
    fn dotted_and_indexed_access() {
        let s = store();
        assert_eq!(s.substitute("{{user.name}}").unwrap(), "ada");
        assert_eq!(s.substitute("{{user.roles[1]}}").unwrap(), "dev");
        assert_eq!(s.substitute("{{user.roles[-1]}}").unwrap(), "dev");
    }

    #[test]
    fn environment_is_a_fallback() {
        let s = store();
        assert_eq!(s.substitute("{{HOME_REGION}}").unwrap(), "eu-west-1");
        assert_eq!(s.substitute("{{env.HOME_REGION}}").unwrap(), "eu-west-1");
    }

    #[test]
    fn single_placeholder_keeps_type_in_values() {
        let s = store();
        let body = json!({"id": "{{id}}", "label": "item-{{id}}", "n": 3, "ok": true});
        assert_eq!(
            s.substitute_value(&body).unwrap(),
            json!({"id": 7, "label": "item-7", "n": 3, "ok": true})
        );
    }

    #[test]
    fn declarations_can_reference_each_other() {
        let mut vars = Variables::new();
        vars.insert("api".into(), json!("{{base}}/v1"));
        vars.insert("base".into(), json!("http://x"));
        let mut s = VariableStore::new();
        s.declare(&vars);
        assert_eq!(s.get("api"), Some(&json!("http://x/v1")));
    }

    #[test]
    fn known_substitution_leaves_generators_and_unknowns() {
        let s = store();
        let v = s.substitute_known_value(&json!({
            "url": "{{base}}/{{missing}}",
            "id": "{{id}}",
            "rid": "{{generator.uuid}}"
        }));
        assert_eq!(
            v,
            json!({"url": "http://x/{{missing}}", "id": 7, "rid": "{{generator.uuid}}"})
        );
    }

    #[test]
    fn generators_resolve() {
        let s = store();
        let v = s.substitute("{{generator.random_int(1,1)}}").unwrap();
        assert_eq!(v, "1");
    }
}
