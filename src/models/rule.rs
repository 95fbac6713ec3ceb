use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rule_id::Variables;

/// A templated rule document with its metadata.
///
/// Rules arrive fully resolved: `id` is in canonical bracket syntax,
/// `content` is raw template text and `variables` already carries any
/// layered defaults. `id`, `title` and `content` are required for a rule
/// to be valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<RuleTrigger>,
    /// Bindings for this rule instance.
    #[serde(default)]
    pub variables: Variables,
    /// The rule's own declared defaults. Variables equal to these are left
    /// out of tracking comments.
    #[serde(default)]
    pub default_variables: Variables,
}

impl Rule {
    /// Defaults overlaid with the instance bindings.
    pub fn effective_variables(&self) -> Variables {
        let mut merged = self.default_variables.clone();
        for (key, value) in &self.variables {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Instance bindings whose value differs from the declared default.
    pub fn non_default_variables(&self) -> Variables {
        self.variables
            .iter()
            .filter(|(key, value)| self.default_variables.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn trigger_type(&self) -> Option<TriggerType> {
        self.trigger.as_ref().map(|t| t.trigger_type)
    }
}

/// When an assistant should apply a rule.
///
/// - `Always`: Included in every conversation
/// - `Manual`: Only when explicitly referenced
/// - `ModelDecision`: The model decides based on the description
/// - `Glob`: When files matching `globs` are involved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Always,
    Manual,
    ModelDecision,
    Glob,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Manual => "manual",
            Self::ModelDecision => "model_decision",
            Self::Glob => "glob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "always" => Some(Self::Always),
            "manual" => Some(Self::Manual),
            "model_decision" => Some(Self::ModelDecision),
            "glob" => Some(Self::Glob),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// File patterns, only meaningful for `Glob`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,
}

impl RuleTrigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            globs: Vec::new(),
        }
    }

    pub fn glob<I, S>(globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trigger_type: TriggerType::Glob,
            globs: globs.into_iter().map(Into::into).collect(),
        }
    }

    /// Template-facing form: `{"type": "...", "globs": [...]}`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.trigger_type.as_str(),
            "globs": self.globs,
        })
    }
}

/// A rule prepared for one transform call.
///
/// Holds the effective variables (rule defaults overlaid with caller
/// overrides) used for templating. Never persisted.
#[derive(Debug, Clone)]
pub struct ProcessedRule {
    pub rule: Arc<Rule>,
    pub variables: Variables,
}

impl ProcessedRule {
    pub fn new(rule: Arc<Rule>) -> Self {
        let variables = rule.effective_variables();
        Self { rule, variables }
    }

    /// Overlay caller overrides on top of the rule's effective variables.
    pub fn with_overrides(mut self, overrides: &Variables) -> Self {
        for (key, value) in overrides {
            self.variables.insert(key.clone(), value.clone());
        }
        self
    }
}

impl From<Rule> for ProcessedRule {
    fn from(rule: Rule) -> Self {
        Self::new(Arc::new(rule))
    }
}
