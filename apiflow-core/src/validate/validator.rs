use crate::error::{ValidationError, Violation};
use crate::types::{Component, Workflow};

use super::rules;

pub struct Validator {
    violations: Vec<Violation>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }

    pub fn validate_workflow(&mut self, wf: &Workflow) {
        rules::workflow::validate_workflow(self, wf, "$");
    }

    pub fn validate_component(&mut self, component: &Component) {
        rules::component::validate_component(self, component, "$");
    }

    pub(crate) fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }
}
