use std::collections::BTreeMap;

use crate::types::{AnyValue, Captures, Step, StepGroup, Variables};

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,

    #[serde(default, skip_serializing_if = "Captures::is_empty")]
    pub captures: Captures,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<StepGroup>,

    /// Process environment captured when the document was loaded.
    #[serde(skip)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Step,
    Group,
    Workflow,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Step => "step",
            ComponentType::Group => "group",
            ComponentType::Workflow => "workflow",
        }
    }
}

/// A reusable fragment: the shape of a [`Workflow`] plus a type tag.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Component {
    #[serde(default)]
    pub name: String,

    /// Optional in the document so a missing tag is reported as an invalid component
    /// instead of a parse error.
    #[serde(default)]
    pub r#type: Option<ComponentType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,

    #[serde(default, skip_serializing_if = "Captures::is_empty")]
    pub captures: Captures,

    /// Variable names visible to importers; `None` exports everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<StepGroup>,
}

impl Component {
    pub fn component_type(&self) -> Option<ComponentType> {
        self.r#type
    }

    /// Variables this component contributes to an importer.
    pub fn exported_variables(&self) -> Variables {
        match &self.exports {
            None => self.variables.clone(),
            Some(names) => self
                .variables
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Import {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ImportOverrides>,
}

/// Structural overrides deep-merged onto an imported step.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ImportOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestOverrides>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct RequestOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, AnyValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<AnyValue>,
}
