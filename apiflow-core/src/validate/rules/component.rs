use crate::types::{Component, ComponentType};
use crate::validate::rules::step::{validate_group, validate_step};
use crate::validate::validator::Validator;

/// Checks the type contract of an already-expanded component.
pub(crate) fn validate_component(v: &mut Validator, c: &Component, path: &str) {
    if c.name.trim().is_empty() {
        v.push(format!("{path}.name"), "is required");
    }

    match c.component_type() {
        None => v.push(format!("{path}.type"), "is required (step, group or workflow)"),
        Some(ComponentType::Step) => {
            if c.steps.len() != 1 || !c.groups.is_empty() {
                v.push(
                    format!("{path}.steps"),
                    format!(
                        "a step component must contain exactly one step (found {} steps, {} groups)",
                        c.steps.len(),
                        c.groups.len()
                    ),
                );
            }
        }
        Some(ComponentType::Group | ComponentType::Workflow) => {
            if c.steps.is_empty() && c.groups.is_empty() {
                v.push(path, "must contain at least one step or group");
            }
        }
    }

    if let Some(exports) = &c.exports {
        for name in exports {
            if !c.variables.contains_key(name) {
                v.push(format!("{path}.exports"), format!("exports unknown variable {name}"));
            }
        }
    }

    for (idx, step) in c.steps.iter().enumerate() {
        validate_step(v, step, &format!("{path}.steps[{idx}]"));
    }
    for (idx, group) in c.groups.iter().enumerate() {
        validate_group(v, group, &format!("{path}.groups[{idx}]"));
    }
}
