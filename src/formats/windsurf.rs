//! Windsurf: `.windsurf/rules/`, either one `rules.md` or one file per rule.
//!
//! Windsurf truncates rules beyond [`WINDSURF_MAX_CHARS`], so longer rules
//! are rejected both by validation and at write time.

use std::path::PathBuf;

use serde_json::Value;

use super::{FormatMetadata, FormatStrategy, Layout};
use crate::error::{FormatError, Result};
use crate::models::{FormatType, OutputMode, Rule, TransformedRule, TriggerType, ValidationResult};
use crate::rule_id::Variables;

/// Per-rule character ceiling.
pub const WINDSURF_MAX_CHARS: usize = 12_000;

pub const PROJECT_RULES_FILENAME: &str = "rules.md";
pub const GLOBAL_RULES_FILENAME: &str = "global_rules.md";

const MULTI_FILE_TEMPLATE: &str = "---
trigger: {{.trigger_type}}
{{- if .globs}}
globs: {{join \",\" .globs}}
{{- end}}
{{- if .description}}
description: {{.description}}
{{- end}}
---

# {{.title}}

{{.content}}";

const SINGLE_FILE_TEMPLATE: &str = "# {{.title}}

{{.content}}";

#[derive(Debug, Clone)]
pub struct WindsurfStrategy {
    mode: OutputMode,
}

impl WindsurfStrategy {
    /// User-level rules are always a single file.
    pub fn new(mode: OutputMode, is_user_rules: bool) -> Self {
        let mode = if is_user_rules { OutputMode::Single } else { mode };
        Self { mode }
    }

    fn trigger_name(trigger: Option<TriggerType>) -> &'static str {
        match trigger {
            None | Some(TriggerType::Always) => "always_on",
            Some(TriggerType::Manual) => "manual",
            Some(TriggerType::ModelDecision) => "model_decision",
            Some(TriggerType::Glob) => "glob",
        }
    }

    fn too_long(rule: &Rule) -> Option<usize> {
        let chars = rule.content.chars().count();
        (chars > WINDSURF_MAX_CHARS).then_some(chars)
    }

    fn limit_message(chars: usize) -> String {
        format!(
            "content is {} characters, exceeding the Windsurf limit of {} characters",
            chars, WINDSURF_MAX_CHARS
        )
    }
}

impl Default for WindsurfStrategy {
    fn default() -> Self {
        Self::new(OutputMode::default(), false)
    }
}

impl FormatStrategy for WindsurfStrategy {
    fn format_type(&self) -> FormatType {
        FormatType::Windsurf
    }

    fn metadata(&self) -> FormatMetadata {
        FormatMetadata {
            format_type: FormatType::Windsurf,
            display_name: "Windsurf",
            description: "Rules in .windsurf/rules, as one file or one file per rule",
            extension: ".md",
            is_directory: self.mode == OutputMode::Multi,
        }
    }

    fn default_template(&self) -> &'static str {
        match self.mode {
            OutputMode::Single => SINGLE_FILE_TEMPLATE,
            OutputMode::Multi => MULTI_FILE_TEMPLATE,
        }
    }

    fn file_extension(&self) -> &'static str {
        ".md"
    }

    fn layout(&self, is_user_rules: bool) -> Layout {
        let dir = PathBuf::from(".windsurf").join("rules");
        if is_user_rules {
            Layout::SingleFile(dir.join(GLOBAL_RULES_FILENAME))
        } else if self.mode == OutputMode::Single {
            Layout::SingleFile(dir.join(PROJECT_RULES_FILENAME))
        } else {
            Layout::Directory(dir)
        }
    }

    fn mode(&self) -> Option<OutputMode> {
        Some(self.mode)
    }

    fn template_extras(&self, rule: &Rule) -> Variables {
        let mut extras = Variables::new();
        extras.insert(
            "trigger_type".into(),
            Value::String(Self::trigger_name(rule.trigger_type()).to_string()),
        );
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
        if let Some(chars) = Self::too_long(rule) {
            result.add_error(
                "content",
                format!("Rule {} {}", rule.id, Self::limit_message(chars)),
                "CONTENT_TOO_LONG",
            );
        }
        if let Some(trigger) = rule.trigger.as_ref() {
            if trigger.trigger_type == TriggerType::Glob && trigger.globs.is_empty() {
                result.add_warning(
                    "trigger.globs",
                    "Glob trigger has no patterns; Windsurf will never activate this rule",
                    "GLOB_WITHOUT_PATTERNS",
                );
            }
        }
    }

    fn check_rule(&self, rule: &TransformedRule) -> Result<()> {
        match Self::too_long(&rule.rule) {
            Some(chars) => Err(FormatError::Constraint {
                rule_id: rule.rule.id.clone(),
                message: Self::limit_message(chars),
            }),
            None => Ok(()),
        }
    }

    fn reserved_filenames(&self) -> &'static [&'static str] {
        &[
            "index.md",
            ".gitkeep",
            PROJECT_RULES_FILENAME,
            GLOBAL_RULES_FILENAME,
        ]
    }
}
