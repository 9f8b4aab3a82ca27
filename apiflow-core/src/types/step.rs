use crate::types::{Captures, DurationSpec, Request, Validation, Variables};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub request: Request,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<Validation>,

    #[serde(default, skip_serializing_if = "Captures::is_empty")]
    pub capture: Captures,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Total number of attempts; `0` and `1` both mean a single attempt.
    #[serde(default)]
    pub retry: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<DurationSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DurationSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatSpec>,
}

impl Step {
    pub fn max_attempts(&self) -> u32 {
        self.retry.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RepeatSpec {
    pub count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DurationSpec>,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepGroup {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<StepGroup>,
}

impl StepGroup {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.groups.is_empty()
    }
}
