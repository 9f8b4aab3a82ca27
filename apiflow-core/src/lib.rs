#![forbid(unsafe_code)]

pub mod error;
pub mod expressions;
pub mod parser;
pub mod resolver;
pub mod types;
pub mod validate;
pub mod variables;

pub use crate::error::{ParseError, ResolveError, TemplateError, ValidationError, Violation};
pub use crate::parser::{parse_document_str, DocumentFormat, ParsedDocument};
pub use crate::resolver::{
    load_workflow, ComponentCache, ComponentResolver, ComponentSource, FsSource, MemorySource,
    ResolverConfig,
};
pub use crate::types::{Component, Step, StepGroup, Workflow};
pub use crate::validate::{validate_component, validate_workflow, Validate};
pub use crate::variables::VariableStore;
