//! Claude: every rule in one `CLAUDE.md`.

use std::path::PathBuf;

use super::{FormatMetadata, FormatStrategy, Layout};
use crate::models::FormatType;

pub const CLAUDE_FILENAME: &str = "CLAUDE.md";

const DEFAULT_TEMPLATE: &str = "# {{.title}}
{{if .description}}
*{{.description}}*
{{end}}
{{.content}}";

#[derive(Debug, Clone, Default)]
pub struct ClaudeStrategy;

impl ClaudeStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl FormatStrategy for ClaudeStrategy {
    fn format_type(&self) -> FormatType {
        FormatType::Claude
    }

    fn metadata(&self) -> FormatMetadata {
        FormatMetadata {
            format_type: FormatType::Claude,
            display_name: "Claude",
            description: "Single CLAUDE.md file with all rules",
            extension: ".md",
            is_directory: false,
        }
    }

    fn default_template(&self) -> &'static str {
        DEFAULT_TEMPLATE
    }

    fn file_extension(&self) -> &'static str {
        ".md"
    }

    /// User rules live in `~/.claude/CLAUDE.md`.
    fn layout(&self, is_user_rules: bool) -> Layout {
        if is_user_rules {
            Layout::SingleFile(PathBuf::from(".claude").join(CLAUDE_FILENAME))
        } else {
            Layout::SingleFile(PathBuf::from(CLAUDE_FILENAME))
        }
    }
}
