//! Error types for format operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("template error while {stage}: {source}")]
    Template {
        stage: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule {rule_id}: {message}")]
    Constraint { rule_id: String, message: String },

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

impl FormatError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }

    pub(crate) fn template(stage: &'static str) -> impl FnOnce(TemplateError) -> Self {
        move |source| Self::Template { stage, source }
    }
}

pub type Result<T, E = FormatError> = std::result::Result<T, E>;
