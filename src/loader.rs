//! Loads rules from a local checkout of a rules repository.
//!
//! A rule `[contexture:languages/go/testing]` lives at
//! `<rules_dir>/languages/go/testing.md`: optional YAML front-matter
//! delimited by `---`, then the Markdown template body.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{Rule, RuleTrigger};
use crate::rule_id::{ParsedRuleId, RuleIdError, Variables};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid rule ID: {0}")]
    InvalidId(#[from] RuleIdError),

    #[error("rule file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid front-matter in {}: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    languages: Vec<String>,
    frameworks: Vec<String>,
    trigger: Option<RuleTrigger>,
    variables: Variables,
}

#[derive(Debug, Clone)]
pub struct LocalRuleLoader {
    rules_dir: PathBuf,
}

impl LocalRuleLoader {
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
        }
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// File backing a rule ID.
    /// Resolve `id` under the rules directory. `.` and `..` segments are
    /// skipped even on hand-built IDs.
    pub fn rule_path(&self, id: &ParsedRuleId) -> PathBuf {
        let relative = id
            .path
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .collect::<Vec<_>>()
            .join("/");
        self.rules_dir.join(format!("{}.md", relative))
    }

    /// Load a rule. Variables embedded in the ID and then `overrides` are
    /// layered over the front-matter defaults.
    pub fn load(&self, id: &str, overrides: &Variables) -> Result<Rule, LoaderError> {
        let parsed = ParsedRuleId::parse(id)?;
        let path = self.rule_path(&parsed);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LoaderError::NotFound(path)),
            Err(source) => return Err(LoaderError::Io { path, source }),
        };

        let (yaml, body) = split_front_matter(&text);
        let front: FrontMatter = match yaml {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)
                .map_err(|source| LoaderError::FrontMatter {
                    path: path.clone(),
                    source,
                })?,
            _ => FrontMatter::default(),
        };

        let mut variables = parsed.variables.clone();
        for (key, value) in overrides {
            variables.insert(key.clone(), value.clone());
        }

        let (title, content) = match front.title {
            Some(title) => (title, body.trim().to_string()),
            None => match take_heading(body) {
                Some((title, rest)) => (title, rest),
                None => (parsed.name().to_string(), body.trim().to_string()),
            },
        };

        debug!(rule_id = %id, path = %path.display(), "Loaded rule");

        let canonical = parsed.clone().with_variables(Variables::new());
        Ok(Rule {
            id: canonical.format(),
            title,
            description: front.description.unwrap_or_default(),
            tags: front.tags,
            languages: front.languages,
            frameworks: front.frameworks,
            content,
            source: parsed.source,
            git_ref: parsed.git_ref,
            trigger: front.trigger,
            variables,
            default_variables: front.variables,
        })
    }
}

/// Split `---` delimited front-matter from the body.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix("---\n") else {
        return (None, content);
    };
    match rest.find("\n---") {
        Some(end) => {
            let body = &rest[end + 4..];
            (Some(&rest[..end]), body.strip_prefix('\n').unwrap_or(body))
        }
        None => (None, content),
    }
}

/// First `# ` heading and the body without it.
fn take_heading(body: &str) -> Option<(String, String)> {
    let mut lines = body.lines();
    let mut before = Vec::new();
    while let Some(line) = lines.next() {
        if let Some(title) = line.strip_prefix("# ") {
            let title = title.trim();
            if title.is_empty() {
                return None;
            }
            let after: Vec<&str> = lines.collect();
            let rest = before
                .into_iter()
                .chain(after)
                .collect::<Vec<_>>()
                .join("\n");
            return Some((title.to_string(), rest.trim().to_string()));
        }
        before.push(line);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_front_matter() {
        let (yaml, body) = split_front_matter("---\ntitle: T\n---\nbody\n");
        assert_eq!(yaml, Some("title: T"));
        assert_eq!(body, "body\n");

        let (yaml, body) = split_front_matter("no front-matter");
        assert_eq!(yaml, None);
        assert_eq!(body, "no front-matter");
    }

    #[test]
    fn test_take_heading() {
        let (title, rest) = take_heading("intro\n# Title\n\nbody").unwrap();
        assert_eq!(title, "Title");
        assert_eq!(rest, "intro\n\nbody");
        assert!(take_heading("## not h1\nbody").is_none());
    }
}
