//! Template error definitions

use std::path::PathBuf;

use thiserror::Error;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Entry template not found: {0}")]
    MissingEntry(String),

    #[error("Template syntax error: {0}")]
    Syntax(#[source] minijinja::Error),

    #[error("Template execution failed: {0}")]
    Render(#[source] minijinja::Error),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;
