use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The assistant tools rules can be generated for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    Claude,
    Cursor,
    Windsurf,
}

impl FormatType {
    pub const ALL: [FormatType; 3] = [Self::Claude, Self::Cursor, Self::Windsurf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Cursor => "cursor",
            Self::Windsurf => "windsurf",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "cursor" => Some(Self::Cursor),
            "windsurf" => Some(Self::Windsurf),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Windsurf output layout.
///
/// - `Single`: all rules in one `rules.md`
/// - `Multi`: one file per rule
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Single,
    #[default]
    Multi,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multi => "multi",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single" => Some(Self::Single),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

/// Per-invocation settings for one format, supplied by the config loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(rename = "type")]
    pub format_type: FormatType,
    /// Root the output layout is resolved against. For user-level rules this
    /// is the user's home directory.
    pub base_dir: PathBuf,
    /// Optional wrapper template file overriding the built-in one.
    #[serde(default)]
    pub template: Option<PathBuf>,
    /// Write to the user-global location instead of the project.
    #[serde(default)]
    pub is_user_rules: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Output layout for formats that offer a choice.
    #[serde(default)]
    pub mode: Option<OutputMode>,
}

fn default_true() -> bool {
    true
}

impl FormatConfig {
    pub fn new(format_type: FormatType, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            format_type,
            base_dir: base_dir.into(),
            template: None,
            is_user_rules: false,
            enabled: true,
            mode: None,
        }
    }

    pub fn user_rules(mut self) -> Self {
        self.is_user_rules = true;
        self
    }

    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = Some(mode);
        self
    }
}
