use regex::Regex;

use crate::expressions::template::{contains_placeholder, parse_template};
use crate::types::{Protocol, Request, Step, StepGroup, ValidationType};
use crate::validate::validator::Validator;

pub(crate) fn validate_step(v: &mut Validator, step: &Step, path: &str) {
    if step.name.trim().is_empty() {
        v.push(format!("{path}.name"), "must not be empty");
    }

    validate_request(v, &step.request, &format!("{path}.request"));

    for (idx, rule) in step.validate.iter().enumerate() {
        let rpath = format!("{path}.validate[{idx}]");
        match rule.r#type {
            ValidationType::JsonPath if rule.path.as_deref().map_or(true, str::is_empty) => {
                v.push(format!("{rpath}.path"), "is required for json_path rules");
            }
            ValidationType::Header if rule.name.as_deref().map_or(true, str::is_empty) => {
                v.push(format!("{rpath}.name"), "is required for header rules");
            }
            ValidationType::Regex => match rule.expected.as_ref().and_then(|e| e.as_str()) {
                None => v.push(format!("{rpath}.expected"), "must be a pattern string"),
                Some(p) if !contains_placeholder(p) && Regex::new(p).is_err() => {
                    v.push(format!("{rpath}.expected"), "must be a valid regular expression")
                }
                Some(_) => {}
            },
            _ => {}
        }
    }

    for (name, capture_path) in &step.capture {
        if capture_path.trim().is_empty() {
            v.push(format!("{path}.capture.{name}"), "must not be empty");
        }
    }

    if let Some(condition) = &step.condition {
        if parse_template(condition).is_err() {
            v.push(format!("{path}.condition"), "has an unclosed placeholder");
        }
    }

    if let Some(repeat) = &step.repeat {
        if repeat.count == 0 {
            v.push(format!("{path}.repeat.count"), "must be at least 1");
        }
    }
}

pub(crate) fn validate_group(v: &mut Validator, group: &StepGroup, path: &str) {
    if group.name.trim().is_empty() {
        v.push(format!("{path}.name"), "must not be empty");
    }
    if group.is_empty() {
        v.push(path, "must contain at least one step or group");
    }
    for (idx, step) in group.steps.iter().enumerate() {
        validate_step(v, step, &format!("{path}.steps[{idx}]"));
    }
    for (idx, nested) in group.groups.iter().enumerate() {
        validate_group(v, nested, &format!("{path}.groups[{idx}]"));
    }
}

fn validate_request(v: &mut Validator, req: &Request, path: &str) {
    match &req.protocol {
        Protocol::Http => {
            if req.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                v.push(format!("{path}.url"), "is required for http requests");
            }
        }
        Protocol::Grpc => {
            if req.service.as_deref().map_or(true, |s| s.trim().is_empty()) {
                v.push(format!("{path}.service"), "is required for grpc requests");
            }
            if req.grpc_method.as_deref().map_or(true, |s| s.trim().is_empty()) {
                v.push(format!("{path}.grpc_method"), "is required for grpc requests");
            }
        }
        Protocol::Other(_) => {}
    }
    for (key, value) in &req.headers {
        if value.is_object() || value.is_array() {
            v.push(format!("{path}.headers.{key}"), "must be a scalar value");
        }
    }
}
