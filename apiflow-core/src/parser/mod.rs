use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures as RegexCaptures, Regex};
use serde::de::DeserializeOwned;

use crate::error::ParseError;
use crate::types::{Component, Workflow};

static ENV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Auto,
}

#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub document: T,
    pub format: DocumentFormat,
}

pub type ParsedDocument = Parsed<Workflow>;

/// Snapshot of the process environment, taken once per document load.
pub fn environment_snapshot() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Expands `${NAME}` references from `env`. Unknown names are left verbatim.
pub fn expand_env(input: &str, env: &BTreeMap<String, String>) -> String {
    ENV_RE
        .replace_all(input, |caps: &RegexCaptures<'_>| {
            env.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn parse_document_str(input: &str, format: DocumentFormat) -> Result<ParsedDocument, ParseError> {
    parse_str::<Workflow>(input, format)
}

pub fn parse_component_str(input: &str, format: DocumentFormat) -> Result<Parsed<Component>, ParseError> {
    parse_str::<Component>(input, format)
}

pub fn parse_str<T: DeserializeOwned>(input: &str, format: DocumentFormat) -> Result<Parsed<T>, ParseError> {
    match format {
        DocumentFormat::Json => Ok(Parsed {
            document: serde_json::from_str::<T>(input)?,
            format,
        }),
        DocumentFormat::Yaml => Ok(Parsed {
            document: serde_yaml::from_str::<T>(input)?,
            format,
        }),
        DocumentFormat::Auto => parse_auto(input),
    }
}

fn parse_auto<T: DeserializeOwned>(input: &str) -> Result<Parsed<T>, ParseError> {
    // JSON always starts with `{` or `[` after trimming.
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return match serde_json::from_str::<T>(input) {
            Ok(doc) => Ok(Parsed {
                document: doc,
                format: DocumentFormat::Json,
            }),
            Err(e) => match serde_yaml::from_str::<T>(input) {
                Ok(doc) => Ok(Parsed {
                    document: doc,
                    format: DocumentFormat::Yaml,
                }),
                Err(_) => Err(ParseError::Json(e)),
            },
        };
    }

    match serde_yaml::from_str::<T>(input) {
        Ok(doc) => Ok(Parsed {
            document: doc,
            format: DocumentFormat::Yaml,
        }),
        Err(e) => {
            if let Ok(doc) = serde_json::from_str::<T>(input) {
                return Ok(Parsed {
                    document: doc,
                    format: DocumentFormat::Json,
                });
            }
            Err(ParseError::Yaml(e))
        }
    }
}
