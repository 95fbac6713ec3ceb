use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::Rule;

/// A rule rendered for one output format.
///
/// Created by transform and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct TransformedRule {
    pub rule: Arc<Rule>,
    /// Final text after both template stages, without tracking comment.
    pub content: String,
    pub filename: String,
    /// Path relative to the project root.
    pub relative_path: String,
    /// Always carries `format`, `filename` and `relative_path`.
    pub metadata: BTreeMap<String, Value>,
    pub transformed_at: DateTime<Utc>,
    pub size: usize,
    /// SHA-256 of `content`, hex encoded. For change reporting only.
    pub content_hash: String,
}

/// A rule reconstructed by reading generated files back.
///
/// The embedded rule is best effort: its ID and title come from the tracking
/// comment and heading, and `source` is only a label when the comment was
/// missing.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledRule {
    #[serde(flatten)]
    pub transformed: TransformedRule,
    /// Modification time of the file holding the rule.
    pub installed_at: DateTime<Utc>,
}

impl InstalledRule {
    pub fn id(&self) -> &str {
        &self.transformed.rule.id
    }

    pub fn title(&self) -> &str {
        &self.transformed.rule.title
    }

    /// How the ID was recovered: `tracking_comment`, `filename` or `opaque`.
    pub fn identity(&self) -> Option<&str> {
        self.transformed
            .metadata
            .get("identity")
            .and_then(Value::as_str)
    }
}
