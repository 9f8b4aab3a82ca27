mod rules;
mod validator;

use crate::error::ValidationError;
use crate::types::{Component, Workflow};
pub use validator::Validator;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for Workflow {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_workflow(self)
    }
}

impl Validate for Component {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_component(self)
    }
}

pub fn validate_workflow(wf: &Workflow) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    v.validate_workflow(wf);
    v.finish()
}

pub fn validate_component(component: &Component) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    v.validate_component(component);
    v.finish()
}
