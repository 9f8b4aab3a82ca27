use tracing::warn;

use crate::error::ResolveError;
use crate::types::{
    Captures, Component, ComponentType, Import, ImportOverrides, Step, StepGroup, Variables,
    Workflow,
};
use crate::variables::VariableStore;

/// Documents that imports can be spliced into.
pub trait ImportTarget {
    fn take_imports(&mut self) -> Vec<Import>;
    fn variables(&self) -> &Variables;
    fn variables_mut(&mut self) -> &mut Variables;
    fn captures_mut(&mut self) -> &mut Captures;
    fn steps_mut(&mut self) -> &mut Vec<Step>;
    fn groups_mut(&mut self) -> &mut Vec<StepGroup>;
}

macro_rules! impl_import_target {
    ($ty:ty) => {
        impl ImportTarget for $ty {
            fn take_imports(&mut self) -> Vec<Import> {
                std::mem::take(&mut self.imports)
            }
            fn variables(&self) -> &Variables {
                &self.variables
            }
            fn variables_mut(&mut self) -> &mut Variables {
                &mut self.variables
            }
            fn captures_mut(&mut self) -> &mut Captures {
                &mut self.captures
            }
            fn steps_mut(&mut self) -> &mut Vec<Step> {
                &mut self.steps
            }
            fn groups_mut(&mut self) -> &mut Vec<StepGroup> {
                &mut self.groups
            }
        }
    };
}

impl_import_target!(Workflow);
impl_import_target!(Component);

/// Everything the imports of one document contribute, in declaration order.
#[derive(Debug, Default)]
pub(crate) struct Expansion {
    pub variables: Variables,
    pub captures: Captures,
    pub steps: Vec<Step>,
    pub groups: Vec<StepGroup>,
}

impl Expansion {
    /// Splices the expansion ahead of the target's own body. The target's own
    /// variable and capture declarations win over imported ones.
    pub fn splice_into<T: ImportTarget>(self, target: &mut T) {
        let mut variables = self.variables;
        variables.extend(std::mem::take(target.variables_mut()));
        *target.variables_mut() = variables;

        let mut captures = self.captures;
        captures.extend(std::mem::take(target.captures_mut()));
        *target.captures_mut() = captures;

        let mut steps = self.steps;
        steps.append(target.steps_mut());
        *target.steps_mut() = steps;

        let mut groups = self.groups;
        groups.append(target.groups_mut());
        *target.groups_mut() = groups;
    }

    pub fn merge(&mut self, mut component: Component, import: &Import) -> Result<(), ResolveError> {
        let kind = component.component_type().ok_or_else(|| ResolveError::InvalidComponent {
            path: import.path.clone(),
            reason: "missing type".into(),
        })?;
        self.variables.extend(component.exported_variables());
        self.captures.extend(std::mem::take(&mut component.captures));

        match kind {
            ComponentType::Step => {
                let mut step = component.steps.into_iter().next().ok_or_else(|| {
                    ResolveError::InvalidComponent {
                        path: import.path.clone(),
                        reason: "step component contains no step".into(),
                    }
                })?;
                if let Some(alias) = &import.alias {
                    step.name = alias.clone();
                }
                self.steps.push(step);
            }
            ComponentType::Group => self.groups.push(StepGroup {
                name: import.alias.clone().unwrap_or(component.name),
                description: component.description,
                parallel: false,
                condition: None,
                steps: component.steps,
                groups: component.groups,
            }),
            ComponentType::Workflow => {
                self.steps.extend(component.steps);
                self.groups.extend(component.groups);
            }
        }
        Ok(())
    }
}

/// Applies import-level variables and structural overrides to a fresh copy of
/// a cached component. Values are bound against the importer's variables.
pub(crate) fn apply_overrides(
    component: &mut Component,
    import: &Import,
    importer: &VariableStore,
) -> Result<(), ResolveError> {
    if !import.variables.is_empty() {
        let bound: Variables = import
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), importer.substitute_known_value(value)))
            .collect();
        // The importer's own declarations win in the shared namespace, so the
        // values are also bound into the component body.
        let mut store = VariableStore::new();
        store.extend(bound.clone());
        bind_into_body(component, &store, &import.path)?;
        component.variables.extend(bound);
    }

    let Some(overrides) = &import.overrides else {
        return Ok(());
    };
    if component.component_type() != Some(ComponentType::Step) {
        warn!(
            path = %import.path,
            component_type = component.component_type().map(|t| t.as_str()).unwrap_or("unknown"),
            "structural overrides only apply to step components; ignoring"
        );
        return Ok(());
    }
    if let Some(step) = component.steps.first_mut() {
        override_step(step, overrides, importer);
    }
    Ok(())
}

fn override_step(step: &mut Step, overrides: &ImportOverrides, importer: &VariableStore) {
    let bind = |s: &str| {
        crate::variables::value_to_string(
            &importer.substitute_known_value(&serde_json::Value::String(s.to_string())),
        )
    };
    if let Some(name) = &overrides.name {
        step.name = bind(name);
    }
    let Some(req) = &overrides.request else {
        return;
    };
    if let Some(url) = &req.url {
        step.request.url = Some(bind(url));
    }
    if let Some(method) = &req.method {
        step.request.method = Some(bind(method));
    }
    for (key, value) in &req.headers {
        step.request
            .headers
            .insert(key.clone(), importer.substitute_known_value(value));
    }
    if let Some(body) = &req.body {
        step.request.body = Some(importer.substitute_known_value(body));
    }
}

/// Binds a component's non-exported variables into its own steps and groups,
/// since only exported names reach the importer's store.
pub(crate) fn bind_private_variables(
    component: &mut Component,
    path: &str,
) -> Result<(), ResolveError> {
    let Some(exports) = &component.exports else {
        return Ok(());
    };
    let private: Variables = component
        .variables
        .iter()
        .filter(|(k, _)| !exports.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if private.is_empty() {
        return Ok(());
    }
    let mut store = VariableStore::new();
    store.declare(&private);
    bind_into_body(component, &store, path)
}

/// Substitutes every placeholder `store` knows in the component's steps and groups.
fn bind_into_body(
    component: &mut Component,
    store: &VariableStore,
    path: &str,
) -> Result<(), ResolveError> {
    let invalid = |e: serde_json::Error| ResolveError::InvalidComponent {
        path: path.to_string(),
        reason: format!("binding variables: {e}"),
    };
    let steps = serde_json::to_value(&component.steps).map_err(invalid)?;
    component.steps = serde_json::from_value(store.substitute_known_value(&steps)).map_err(invalid)?;
    let groups = serde_json::to_value(&component.groups).map_err(invalid)?;
    component.groups =
        serde_json::from_value(store.substitute_known_value(&groups)).map_err(invalid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Request, RequestOverrides};
    use serde_json::json;

    fn step(name: &str, url: &str) -> Step {
        Step {
            name: name.into(),
            description: None,
            request: Request {
                url: Some(url.into()),
                ..Default::default()
            },
            validate: Vec::new(),
            capture: Captures::new(),
            condition: None,
            retry: 0,
            retry_delay: None,
            timeout: None,
            repeat: None,
        }
    }

    fn component(kind: ComponentType, steps: Vec<Step>) -> Component {
        Component {
            name: "comp".into(),
            r#type: Some(kind),
            version: None,
            description: None,
            variables: Variables::new(),
            imports: Vec::new(),
            captures: Captures::new(),
            exports: None,
            steps,
            groups: Vec::new(),
        }
    }

    fn import(path: &str) -> Import {
        Import {
            path: path.into(),
            alias: None,
            variables: Variables::new(),
            overrides: None,
        }
    }

    #[test]
    fn header_overrides_merge_by_key() {
        let mut s = step("login", "http://a/login");
        s.request.headers.insert("Accept".into(), json!("application/json"));
        s.request.headers.insert("X-Trace".into(), json!("1"));
        let mut c = component(ComponentType::Step, vec![s]);

        let mut imp = import("login.yml");
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("X-Trace".into(), json!("{{trace}}"));
        imp.overrides = Some(ImportOverrides {
            name: None,
            request: Some(RequestOverrides {
                url: Some("{{base}}/signin".into()),
                headers,
                ..Default::default()
            }),
        });

        let mut importer = VariableStore::new();
        importer.set("base", json!("http://b"));
        apply_overrides(&mut c, &imp, &importer).unwrap();

        let req = &c.steps[0].request;
        assert_eq!(req.url.as_deref(), Some("http://b/signin"));
        assert_eq!(req.headers["Accept"], json!("application/json"));
        assert_eq!(req.headers["X-Trace"], json!("{{trace}}"));
    }

    #[test]
    fn overrides_on_group_components_are_ignored() {
        let mut c = component(ComponentType::Group, vec![step("a", "http://a")]);
        let mut imp = import("g.yml");
        imp.overrides = Some(ImportOverrides {
            name: Some("renamed".into()),
            request: None,
        });
        apply_overrides(&mut c, &imp, &VariableStore::new()).unwrap();
        assert_eq!(c.steps[0].name, "a");
    }

    #[test]
    fn import_variables_are_bound_into_the_body() {
        let mut c = component(ComponentType::Step, vec![step("a", "http://x/{{user}}/{{id}}")]);
        c.variables.insert("user".into(), json!("ada"));
        let mut imp = import("a.yml");
        imp.variables.insert("user".into(), json!("{{admin}}"));
        imp.variables.insert("rid".into(), json!("{{generator.uuid}}"));

        let mut importer = VariableStore::new();
        importer.set("admin", json!("bob"));
        apply_overrides(&mut c, &imp, &importer).unwrap();

        assert_eq!(c.steps[0].request.url.as_deref(), Some("http://x/bob/{{id}}"));
        assert_eq!(c.variables["user"], json!("bob"));
        assert_eq!(c.variables["rid"], json!("{{generator.uuid}}"));
    }

    #[test]
    fn private_variables_are_bound_into_steps() {
        let mut c = component(ComponentType::Step, vec![step("a", "{{host}}/{{path}}")]);
        c.variables.insert("host".into(), json!("http://h"));
        c.variables.insert("path".into(), json!("p"));
        c.exports = Some(vec!["path".into()]);
        bind_private_variables(&mut c, "a.yml").unwrap();
        assert_eq!(c.steps[0].request.url.as_deref(), Some("http://h/{{path}}"));
        assert_eq!(c.exported_variables().len(), 1);
    }

    #[test]
    fn splice_puts_imports_first_and_own_variables_last() {
        let mut wf = Workflow {
            name: "wf".into(),
            steps: vec![step("own", "http://own")],
            ..Default::default()
        };
        wf.variables.insert("x".into(), json!("own"));

        let mut exp = Expansion::default();
        let mut c = component(ComponentType::Step, vec![step("imported", "http://i")]);
        c.variables.insert("x".into(), json!("imported"));
        c.variables.insert("y".into(), json!(1));
        let mut imp = import("i.yml");
        imp.alias = Some("Foo".into());
        exp.merge(c, &imp).unwrap();
        exp.splice_into(&mut wf);

        let names: Vec<_> = wf.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Foo", "own"]);
        assert_eq!(wf.variables["x"], json!("own"));
        assert_eq!(wf.variables["y"], json!(1));
    }
}
