use crate::types::Workflow;
use crate::validate::rules::step::{validate_group, validate_step};
use crate::validate::validator::Validator;

pub(crate) fn validate_workflow(v: &mut Validator, wf: &Workflow, path: &str) {
    if wf.name.trim().is_empty() {
        v.push(format!("{path}.name"), "must not be empty");
    }

    if wf.steps.is_empty() && wf.groups.is_empty() {
        v.push(path, "must contain at least one step or group");
    }

    for (name, capture_path) in &wf.captures {
        if capture_path.trim().is_empty() {
            v.push(format!("{path}.captures.{name}"), "must not be empty");
        }
    }

    for (idx, step) in wf.steps.iter().enumerate() {
        validate_step(v, step, &format!("{path}.steps[{idx}]"));
    }
    for (idx, group) in wf.groups.iter().enumerate() {
        validate_group(v, group, &format!("{path}.groups[{idx}]"));
    }
}
