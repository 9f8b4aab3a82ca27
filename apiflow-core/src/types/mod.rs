mod common;
mod request;
mod step;
mod validation;
mod workflow;

pub use common::{deserialize_duration, parse_duration, AnyValue, Captures, DurationSpec, Variables};
pub use request::{ApiKeyLocation, Auth, AuthType, Protocol, Request};
pub use step::{RepeatSpec, Step, StepGroup};
pub use validation::{Operator, Validation, ValidationType};
pub use workflow::{
    Component, ComponentType, Import, ImportOverrides, RequestOverrides, Workflow,
};
