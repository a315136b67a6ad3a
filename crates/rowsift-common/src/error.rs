use std::fmt;

use serde::Serialize;
use serde_json::error::Category;

/// Why a configuration document could not be imported.
///
/// Import is all-or-nothing: any of these means no part of the document was
/// applied.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// Well-formed JSON that lacks a required field or has a field of the
    /// wrong shape.
    #[error("invalid configuration document: {0}")]
    Structure(#[source] serde_json::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn from_parse(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => ConfigError::Structure(err),
            Category::Io => ConfigError::Io(err.into()),
            Category::Syntax | Category::Eof => ConfigError::Syntax(err),
        }
    }
}

/// A non-fatal problem found while validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    /// JSON-pointer-ish location, e.g. `vars[1].name`.
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
