//! Output formats.
//!
//! Every format shares one orchestrator ([`Format`]) that implements
//! transform, validate, write, list and remove. The parts that vary between
//! tools (wrapper template, layout, file extension, extra checks) come from
//! a [`FormatStrategy`].

pub mod base;
mod claude;
mod common;
mod cursor;
mod registry;
mod windsurf;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::models::{FormatType, OutputMode, Rule, TransformedRule, ValidationResult};
use crate::rule_id::Variables;

pub use claude::ClaudeStrategy;
pub use common::{Format, FormatOptions, SECTION_SEPARATOR};
pub use cursor::CursorStrategy;
pub use registry::FormatRegistry;
pub use windsurf::{WindsurfStrategy, WINDSURF_MAX_CHARS};

/// Footer closing every single-file output.
pub const GENERATED_FOOTER: &str = "*Generated by Contexture CLI*";

/// Where a format puts its output, relative to the configured base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// All rules in one file.
    SingleFile(PathBuf),
    /// One file per rule inside a directory.
    Directory(PathBuf),
}

impl Layout {
    pub fn path(&self) -> &Path {
        match self {
            Self::SingleFile(path) | Self::Directory(path) => path,
        }
    }

    pub fn is_single_file(&self) -> bool {
        matches!(self, Self::SingleFile(_))
    }
}

/// Descriptive information about a format.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FormatMetadata {
    pub format_type: FormatType,
    pub display_name: &'static str,
    pub description: &'static str,
    pub extension: &'static str,
    /// Whether the project-level output is a directory of files.
    pub is_directory: bool,
}

/// The behaviour that differs between formats.
pub trait FormatStrategy: std::fmt::Debug + Send + Sync {
    fn format_type(&self) -> FormatType;

    fn metadata(&self) -> FormatMetadata;

    /// Built-in wrapper template rendered around each rule's content.
    fn default_template(&self) -> &'static str;

    /// File extension including the dot.
    fn file_extension(&self) -> &'static str;

    fn layout(&self, is_user_rules: bool) -> Layout;

    fn generate_filename(&self, rule_id: &str) -> String {
        base::generate_filename(rule_id, self.file_extension())
    }

    /// Output layout choice, for formats that have one.
    fn mode(&self) -> Option<OutputMode> {
        None
    }

    /// Extra variables for the wrapper template. Also copied into the
    /// transformed rule's metadata.
    fn template_extras(&self, _rule: &Rule) -> Variables {
        Variables::new()
    }

    /// Format-specific validation on top of the shared checks.
    fn validate_rule(&self, _rule: &Rule, _result: &mut ValidationResult) {}

    /// Hard constraints enforced at write time, whether or not the caller
    /// validated first.
    fn check_rule(&self, _rule: &TransformedRule) -> Result<()> {
        Ok(())
    }

    /// File names in the rules directory that are never rules.
    fn reserved_filenames(&self) -> &'static [&'static str] {
        &["index.md", ".gitkeep"]
    }

    /// Leading block of a single-file output.
    fn single_file_header(&self, rule_count: usize, generated_at: &str) -> String {
        format!(
            "# {} Rules\n\nThis file contains {} rules generated by Contexture CLI.\n\nGenerated at: {}",
            self.metadata().display_name,
            rule_count,
            generated_at
        )
    }
}

/// Tagged set of the known strategies.
#[derive(Debug, Clone)]
pub enum Strategy {
    Claude(ClaudeStrategy),
    Cursor(CursorStrategy),
    Windsurf(WindsurfStrategy),
}

impl Strategy {
    pub fn as_strategy(&self) -> &dyn FormatStrategy {
        match self {
            Self::Claude(s) => s,
            Self::Cursor(s) => s,
            Self::Windsurf(s) => s,
        }
    }
}
