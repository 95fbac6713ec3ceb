//! Cursor: one `.mdc` file per rule under `.cursor/rules/`.

use std::path::PathBuf;

use serde_json::Value;

use super::{FormatMetadata, FormatStrategy, Layout};
use crate::models::{FormatType, Rule, TriggerType, ValidationResult};
use crate::rule_id::Variables;

const DEFAULT_TEMPLATE: &str = "---
{{- if .description}}
description: {{.description}}
{{- end}}
{{- if .globs}}
globs: {{join \",\" .globs}}
{{- end}}
alwaysApply: {{.always_apply}}
---

# {{.title}}

{{.content}}";

#[derive(Debug, Clone, Default)]
pub struct CursorStrategy;

impl CursorStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl FormatStrategy for CursorStrategy {
    fn format_type(&self) -> FormatType {
        FormatType::Cursor
    }

    fn metadata(&self) -> FormatMetadata {
        FormatMetadata {
            format_type: FormatType::Cursor,
            display_name: "Cursor",
            description: "One .mdc file per rule in .cursor/rules",
            extension: ".mdc",
            is_directory: true,
        }
    }

    fn default_template(&self) -> &'static str {
        DEFAULT_TEMPLATE
    }

    fn file_extension(&self) -> &'static str {
        ".mdc"
    }

    fn layout(&self, _is_user_rules: bool) -> Layout {
        Layout::Directory(PathBuf::from(".cursor").join("rules"))
    }

    /// Rules without a trigger apply everywhere.
    fn template_extras(&self, rule: &Rule) -> Variables {
        let mut extras = Variables::new();
        let always = matches!(rule.trigger_type(), None | Some(TriggerType::Always));
        extras.insert("always_apply".into(), Value::Bool(always));

        if let Some(trigger) = rule.trigger.as_ref() {
            if trigger.trigger_type == TriggerType::Glob && !trigger.globs.is_empty() {
                extras.insert(
                    "globs".into(),
                    Value::Array(trigger.globs.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        extras
    }

    fn validate_rule(&self, rule: &Rule, result: &mut ValidationResult) {
        if let Some(trigger) = rule.trigger.as_ref() {
            if trigger.trigger_type == TriggerType::Glob && trigger.globs.is_empty() {
                result.add_warning(
                    "trigger.globs",
                    "Glob trigger has no patterns; Cursor will never attach this rule",
                    "GLOB_WITHOUT_PATTERNS",
                );
            }
        }
    }
}
