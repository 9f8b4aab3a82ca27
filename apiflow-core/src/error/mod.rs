use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("document failed validation ({violations_len} violations)")]
pub struct ValidationError {
    pub violations: Vec<Violation>,
    violations_len: usize,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        let violations_len = violations.len();
        Self {
            violations,
            violations_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors that abort resolution. A workflow never partially resolves.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("component not found: {path} (tried {})", tried.join(", "))]
    ComponentNotFound { path: String, tried: Vec<String> },

    #[error("circular import: {}", chain.join(" -> "))]
    CircularImport { chain: Vec<String> },

    #[error("import depth exceeded {limit} while loading {path} (possible circular import)")]
    ImportDepthExceeded { path: String, limit: usize },

    #[error("component load attempts exceeded {limit} while loading {path} (possible circular import)")]
    LoadAttemptsExceeded { path: String, limit: usize },

    #[error("invalid component {path}: {reason}")]
    InvalidComponent { path: String, reason: String },

    #[error("invalid document {path}: {}", source.violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "))]
    InvalidDocument {
        path: String,
        #[source]
        source: ValidationError,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// True for every variant that signals an import cycle, including the ceilings
    /// that catch cycles the path tracking could not see.
    pub fn is_circular(&self) -> bool {
        matches!(
            self,
            ResolveError::CircularImport { .. }
                | ResolveError::ImportDepthExceeded { .. }
                | ResolveError::LoadAttemptsExceeded { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("unclosed placeholder (missing '}}}}') in: {0}")]
    UnclosedPlaceholder(String),
    #[error("invalid generator {name}: {reason}")]
    InvalidGenerator { name: String, reason: String },
}
