use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A single validation finding.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: String,
}

/// Outcome of validating a rule. Errors and warnings are data, not failures;
/// callers decide whether to proceed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub metadata: BTreeMap<String, Value>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>, code: &str) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: impl Into<String>, code: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        });
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
