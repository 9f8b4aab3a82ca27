use crate::types::AnyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    StatusCode,
    JsonPath,
    Header,
    BodyContains,
    Regex,
    ResponseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    #[serde(rename = "eq", alias = "==", alias = "equals")]
    Eq,
    #[serde(rename = "ne", alias = "!=", alias = "not_equals")]
    Ne,
    #[serde(rename = "lt", alias = "<")]
    Lt,
    #[serde(rename = "le", alias = "<=")]
    Le,
    #[serde(rename = "gt", alias = ">")]
    Gt,
    #[serde(rename = "ge", alias = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "matches")]
    Matches,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not_exists")]
    NotExists,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::Matches => "matches",
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
        }
    }
}

/// One assertion against a response.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Validation {
    pub r#type: ValidationType,

    /// JSONPath for `json_path` rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Header name for `header` rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<AnyValue>,
}

impl Validation {
    pub fn effective_operator(&self) -> Operator {
        match self.operator {
            Some(op) => op,
            None if self.r#type == ValidationType::JsonPath && self.expected.is_none() => {
                Operator::Exists
            }
            None if self.r#type == ValidationType::BodyContains => Operator::Contains,
            None if self.r#type == ValidationType::Regex => Operator::Matches,
            None => Operator::Eq,
        }
    }

    /// Human-readable label used in results, e.g. `json_path $.id == 7`.
    pub fn describe(&self) -> String {
        let subject = match self.r#type {
            ValidationType::StatusCode => "status_code".to_string(),
            ValidationType::JsonPath => {
                format!("json_path {}", self.path.as_deref().unwrap_or("$"))
            }
            ValidationType::Header => format!("header {}", self.name.as_deref().unwrap_or("")),
            ValidationType::BodyContains => "body".to_string(),
            ValidationType::Regex => "body".to_string(),
            ValidationType::ResponseTime => "response_time_ms".to_string(),
        };
        match &self.expected {
            Some(v) => format!("{subject} {} {v}", self.effective_operator().as_str()),
            None => format!("{subject} {}", self.effective_operator().as_str()),
        }
    }
}
