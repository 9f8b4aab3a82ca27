use std::collections::BTreeMap;

use apiflow_core::types::{Auth, Request};
use apiflow_core::variables::value_to_string;
use apiflow_core::{TemplateError, VariableStore};
use serde_json::Value as JsonValue;

use super::ResolvedRequest;

/// Strictly substitutes every template field of `req`.
///
/// Header, query and metadata values are coerced to strings; body and data keep
/// the types a lone placeholder resolves to.
pub fn resolve_request(req: &Request, store: &VariableStore) -> Result<ResolvedRequest, TemplateError> {
    let opt = |s: &Option<String>| s.as_deref().map(|s| store.substitute(s)).transpose();
    let body = req.body.as_ref().map(|b| store.substitute_value(b)).transpose()?;
    let data = req.data.as_ref().map(|d| store.substitute_value(d)).transpose()?;

    Ok(ResolvedRequest {
        protocol: req.protocol.clone(),
        method: store.substitute(req.method_or_default())?.to_ascii_uppercase(),
        url: opt(&req.url)?.unwrap_or_default(),
        headers: string_map(&req.headers, store)?,
        query: string_map(&req.query, store)?,
        body,
        auth: req.auth.as_ref().map(|a| resolve_auth(a, store)).transpose()?,
        service: opt(&req.service)?,
        grpc_method: opt(&req.grpc_method)?,
        server_addr: opt(&req.server_addr)?,
        insecure: req.insecure,
        data,
        metadata: string_map(&req.metadata, store)?,
    })
}

fn resolve_auth(auth: &Auth, store: &VariableStore) -> Result<Auth, TemplateError> {
    let opt = |s: &Option<String>| s.as_deref().map(|s| store.substitute(s)).transpose();
    Ok(Auth {
        r#type: auth.r#type,
        token: opt(&auth.token)?,
        username: opt(&auth.username)?,
        password: opt(&auth.password)?,
        key: opt(&auth.key)?,
        value: opt(&auth.value)?,
        location: auth.location,
    })
}

fn string_map(
    map: &BTreeMap<String, JsonValue>,
    store: &VariableStore,
) -> Result<BTreeMap<String, String>, TemplateError> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), value_to_string(&store.substitute_value(v)?))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_every_field() {
        let mut store = VariableStore::new();
        store.set("base", json!("http://x"));
        store.set("id", json!(7));
        store.set("token", json!("abc"));

        let mut req = Request {
            method: Some("post".into()),
            url: Some("{{base}}/item/{{id}}".into()),
            body: Some(json!({"id": "{{id}}", "note": "n-{{id}}"})),
            ..Default::default()
        };
        req.headers.insert("Authorization".into(), json!("Bearer {{token}}"));
        req.query.insert("page".into(), json!("{{id}}"));

        let resolved = resolve_request(&req, &store).unwrap();
        assert_eq!(resolved.method, "POST");
        assert_eq!(resolved.url, "http://x/item/7");
        assert_eq!(resolved.headers["Authorization"], "Bearer abc");
        assert_eq!(resolved.query["page"], "7");
        assert_eq!(resolved.body, Some(json!({"id": 7, "note": "n-7"})));
    }

    #[test]
    fn undefined_reference_fails() {
        let req = Request {
            url: Some("{{base}}/x".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_request(&req, &VariableStore::new()).unwrap_err(),
            TemplateError::UndefinedVariable("base".into())
        );
    }
}
