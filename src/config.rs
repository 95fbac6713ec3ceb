//! Project configuration (`.contexture.yaml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{FormatConfig, FormatType, OutputMode};
use crate::rule_id::Variables;

pub const CONFIG_FILE: &str = ".contexture.yaml";

const CONFIG_VERSION: u32 = 1;
const DEFAULT_RULES_DIR: &str = "rules";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Local checkout rule paths resolve against, relative to the project.
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,
    #[serde(default = "default_formats")]
    pub formats: Vec<FormatEntry>,
    #[serde(default)]
    pub rules: Vec<RuleRef>,
}

/// One output format as configured by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatEntry {
    #[serde(rename = "type")]
    pub format_type: FormatType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Custom wrapper template, relative to the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    /// Write to the user's home directory instead of the project.
    #[serde(default)]
    pub user_rules: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OutputMode>,
}

impl FormatEntry {
    pub fn new(format_type: FormatType) -> Self {
        Self {
            format_type,
            enabled: true,
            template: None,
            user_rules: false,
            mode: None,
        }
    }
}

/// A rule selected for the project: a bare ID or an ID with variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RuleRef {
    Id(String),
    WithVariables {
        id: String,
        #[serde(default)]
        variables: Variables,
    },
}

impl RuleRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::WithVariables { id, .. } => id,
        }
    }

    pub fn variables(&self) -> Variables {
        match self {
            Self::Id(_) => Variables::new(),
            Self::WithVariables { variables, .. } => variables.clone(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RULES_DIR)
}

fn default_formats() -> Vec<FormatEntry> {
    vec![FormatEntry::new(FormatType::Claude)]
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            rules_dir: default_rules_dir(),
            formats: default_formats(),
            rules: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load the configuration for the project at `project_dir`.
    /// Returns the default config if the file doesn't exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = config_path(project_dir);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Save the configuration into `project_dir`.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(config_path(project_dir), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn rules_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.rules_dir)
    }

    /// Per-invocation settings for every enabled format. User-level formats
    /// are rooted at `home_dir`.
    pub fn format_configs(
        &self,
        project_dir: &Path,
        home_dir: Option<&Path>,
    ) -> Result<Vec<FormatConfig>> {
        self.formats
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| {
                let base_dir = if entry.user_rules {
                    home_dir
                        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                        .to_path_buf()
                } else {
                    project_dir.to_path_buf()
                };
                Ok(FormatConfig {
                    format_type: entry.format_type,
                    base_dir,
                    template: entry.template.as_ref().map(|t| project_dir.join(t)),
                    is_user_rules: entry.user_rules,
                    enabled: entry.enabled,
                    mode: entry.mode,
                })
            })
            .collect()
    }
}

fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE)
}

/// The user's home directory, where user-level rules are written.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}
