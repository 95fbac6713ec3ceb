//! The shared orchestrator behind every format.
//!
//! [`Format`] implements transform, validate, write, list and remove once;
//! the strategy it wraps decides templates, paths and extra constraints.
//!
//! There is no index of installed rules. `list` and `remove` recover state
//! by reading generated files back, identifying each rule by its tracking
//! comment, then its file name, then an opaque label.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{self, BaseFormat};
use super::{FormatMetadata, FormatStrategy, Layout, Strategy, GENERATED_FOOTER};
use crate::error::{FormatError, Result};
use crate::models::{
    FormatConfig, FormatType, InstalledRule, OutputMode, ProcessedRule, Rule, TransformedRule,
    ValidationResult,
};
use crate::rule_id::{is_rule_id, ParsedRuleId};

/// Boundary between sections of a single-file output.
pub const SECTION_SEPARATOR: &str = "\n---\n";

/// What writers emit around [`SECTION_SEPARATOR`].
const SECTION_JOIN: &str = "\n\n---\n\n";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Construction options for a [`Format`].
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Output layout for formats that offer a choice.
    pub mode: Option<OutputMode>,
    /// Wrapper template file replacing the built-in one.
    pub template: Option<PathBuf>,
    pub user_rules: bool,
}

impl FormatOptions {
    pub fn from_config(config: &FormatConfig) -> Self {
        Self {
            mode: config.mode,
            template: config.template.clone(),
            user_rules: config.is_user_rules,
        }
    }
}

/// One output format: shared behaviour plus a strategy.
#[derive(Debug, Clone)]
pub struct Format {
    base: BaseFormat,
    strategy: Strategy,
    /// Wrapper template in effect, custom or built-in.
    template: String,
    user_rules: bool,
}

impl Format {
    /// A custom template that is missing or does not parse is logged and
    /// replaced by the built-in one.
    pub fn new(strategy: Strategy, options: &FormatOptions) -> Self {
        let format_type = strategy.as_strategy().format_type();
        let base = BaseFormat::new(format_type);
        let default_template = strategy.as_strategy().default_template();

        let template = match options.template.as_deref() {
            Some(path) => load_custom_template(&base, format_type, path)
                .unwrap_or_else(|| default_template.to_string()),
            None => default_template.to_string(),
        };

        Self {
            base,
            strategy,
            template,
            user_rules: options.user_rules,
        }
    }

    fn strategy(&self) -> &dyn FormatStrategy {
        self.strategy.as_strategy()
    }

    pub fn format_type(&self) -> FormatType {
        self.base.format_type()
    }

    pub fn metadata(&self) -> FormatMetadata {
        self.strategy().metadata()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_single_file(&self) -> bool {
        self.strategy().layout(self.user_rules).is_single_file()
    }

    /// Absolute location of this format's output under `config`.
    pub fn output_path(&self, config: &FormatConfig) -> PathBuf {
        config
            .base_dir
            .join(self.strategy().layout(config.is_user_rules).path())
    }

    // ============================================================
    // Transform
    // ============================================================

    /// Render a rule in two stages: its own content as a template, then the
    /// format wrapper with `content` bound to the stage one result.
    pub fn transform(&self, processed: &ProcessedRule) -> Result<TransformedRule> {
        let rule = &processed.rule;
        let strategy = self.strategy();

        let rendered = self.base.render_with(
            "rendering rule content",
            rule,
            &processed.variables,
            &rule.content,
            &[],
        )?;

        let extras = strategy.template_extras(rule);
        let mut wrapper_vars = extras.clone();
        wrapper_vars.insert("content".into(), Value::String(rendered));

        let content = self
            .base
            .render_with(
                "rendering format template",
                rule,
                &processed.variables,
                &self.template,
                &[&wrapper_vars],
            )?
            .trim_end()
            .to_string();

        let (filename, relative_path) = match strategy.layout(self.user_rules) {
            Layout::SingleFile(path) => (file_name(&path), path_string(&path)),
            Layout::Directory(dir) => {
                let filename = strategy.generate_filename(&rule.id);
                let relative = path_string(&dir.join(&filename));
                (filename, relative)
            }
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("format".into(), Value::from(self.format_type().as_str()));
        metadata.insert("filename".into(), Value::from(filename.clone()));
        metadata.insert("relative_path".into(), Value::from(relative_path.clone()));
        if let Some(mode) = strategy.mode() {
            metadata.insert("mode".into(), Value::from(mode.as_str()));
        }
        for (key, value) in extras {
            metadata.insert(key, value);
        }

        debug!(rule_id = %rule.id, format = %self.format_type(), "Transformed rule");

        Ok(TransformedRule {
            rule: Arc::clone(rule),
            size: content.len(),
            content_hash: base::content_hash(&content),
            content,
            filename,
            relative_path,
            metadata,
            transformed_at: Utc::now(),
        })
    }

    // ============================================================
    // Validate
    // ============================================================

    pub fn validate(&self, rule: &Rule) -> ValidationResult {
        let strategy = self.strategy();
        let mut result = self.base.validate_rule(rule);
        if let Some(mode) = strategy.mode() {
            result = result.with_metadata("mode", mode.as_str());
        }

        if !rule.content.trim().is_empty() {
            if let Err(e) = self.base.engine().validate(&rule.content) {
                result.add_error("content", e.to_string(), "INVALID_TEMPLATE");
            }
        }

        strategy.validate_rule(rule, &mut result);
        result
    }

    // ============================================================
    // Write
    // ============================================================

    /// Persist `rules` as the complete set for this format. Single-file
    /// outputs are rebuilt; multi-file outputs get one file per rule.
    pub fn write(&self, rules: &[TransformedRule], config: &FormatConfig) -> Result<()> {
        if rules.is_empty() {
            debug!(format = %self.format_type(), "No rules to write");
            return Ok(());
        }

        let strategy = self.strategy();
        for rule in rules {
            strategy.check_rule(rule)?;
        }

        match strategy.layout(config.is_user_rules) {
            Layout::SingleFile(relative) => {
                let sections: Vec<String> = rules.iter().map(tracked_content).collect();
                self.write_single(&config.base_dir.join(relative), &sections)
            }
            Layout::Directory(relative) => {
                check_unique_filenames(rules)?;
                self.write_multi(&config.base_dir.join(relative), rules)
            }
        }
    }

    fn write_single(&self, path: &Path, sections: &[String]) -> Result<()> {
        let body = render_body(sections);

        // Same rules as last time: keep the file, and its timestamp, as is.
        if let Some(existing) = base::read_optional(path)? {
            if existing_body(&existing) == Some(body.as_str()) {
                debug!(path = %path.display(), "Output unchanged, skipping write");
                return Ok(());
            }
        }

        let generated_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let header = self
            .strategy()
            .single_file_header(sections.len(), &generated_at);
        base::write_if_changed(path, &format!("{}{}", header, body))?;

        info!(
            format = %self.format_type(),
            path = %path.display(),
            rules = sections.len(),
            "Wrote rules file"
        );
        Ok(())
    }

    fn write_multi(&self, dir: &Path, rules: &[TransformedRule]) -> Result<()> {
        base::ensure_dir(dir)?;

        let mut written = 0;
        for rule in rules {
            let path = dir.join(&rule.filename);
            let content = format!("{}\n", tracked_content(rule));
            if base::write_if_changed(&path, &content)? {
                written += 1;
            }
        }

        info!(
            format = %self.format_type(),
            dir = %dir.display(),
            written,
            unchanged = rules.len() - written,
            "Wrote rule files"
        );
        Ok(())
    }

    // ============================================================
    // List
    // ============================================================

    /// Rules currently installed under `config`, reconstructed from disk.
    /// Nothing generated yet is an empty list, not an error.
    pub fn list(&self, config: &FormatConfig) -> Result<Vec<InstalledRule>> {
        match self.strategy().layout(config.is_user_rules) {
            Layout::SingleFile(relative) => self.list_single(&config.base_dir, &relative),
            Layout::Directory(relative) => self.list_multi(&config.base_dir, &relative),
        }
    }

    fn list_single(&self, base_dir: &Path, relative: &Path) -> Result<Vec<InstalledRule>> {
        let path = base_dir.join(relative);
        let Some(text) = base::read_optional(&path)? else {
            return Ok(Vec::new());
        };
        let installed_at = base::modified_time(&path)?;
        let filename = file_name(relative);
        let relative_path = path_string(relative);

        let rules = split_sections(&text)
            .iter()
            .enumerate()
            .map(|(index, section)| {
                let label = base::extract_title(section)
                    .unwrap_or_else(|| format!("section-{}", index + 1));
                let mut installed =
                    self.reconstruct(section, None, &label, &filename, &relative_path, installed_at);
                installed
                    .transformed
                    .metadata
                    .insert("section".into(), Value::from(index));
                installed
            })
            .collect();
        Ok(rules)
    }

    fn list_multi(&self, base_dir: &Path, relative: &Path) -> Result<Vec<InstalledRule>> {
        let dir = base_dir.join(relative);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FormatError::io("read rules directory", &dir)(e)),
        };

        let strategy = self.strategy();
        let extension = strategy.file_extension();
        let reserved = strategy.reserved_filenames();

        let mut filenames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(FormatError::io("read rules directory", &dir))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(extension) && !reserved.contains(&name.as_str()) {
                filenames.push(name);
            }
        }
        filenames.sort();

        let mut rules = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let path = dir.join(&filename);
            let Some(text) = base::read_optional(&path)? else {
                // Deleted between listing and reading.
                continue;
            };
            let installed_at = base::modified_time(&path)?;
            let stem = filename.strip_suffix(extension).unwrap_or(&filename);
            let relative_path = path_string(&relative.join(&filename));
            rules.push(self.reconstruct(
                &text,
                Some(stem),
                stem,
                &filename,
                &relative_path,
                installed_at,
            ));
        }
        Ok(rules)
    }

    fn reconstruct(
        &self,
        text: &str,
        stem: Option<&str>,
        label: &str,
        filename: &str,
        relative_path: &str,
        installed_at: DateTime<Utc>,
    ) -> InstalledRule {
        let (id, identity) = base::resolve_identity(text, stem, label);
        let parsed = ParsedRuleId::parse_lenient(&id);
        let content = base::strip_tracking_comments(text);
        let title = base::extract_title(&content)
            .or_else(|| stem.map(str::to_string))
            .unwrap_or_else(|| parsed.name().to_string());

        let rule = Rule {
            id,
            title,
            content: content.clone(),
            source: parsed.source.clone(),
            git_ref: parsed.git_ref.clone(),
            variables: parsed.variables.clone(),
            ..Default::default()
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("format".into(), Value::from(self.format_type().as_str()));
        metadata.insert("filename".into(), Value::from(filename));
        metadata.insert("relative_path".into(), Value::from(relative_path));
        metadata.insert("identity".into(), Value::from(identity.as_str()));

        InstalledRule {
            transformed: TransformedRule {
                rule: Arc::new(rule),
                size: content.len(),
                content_hash: base::content_hash(&content),
                content,
                filename: filename.to_string(),
                relative_path: relative_path.to_string(),
                metadata,
                transformed_at: installed_at,
            },
            installed_at,
        }
    }

    // ============================================================
    // Remove
    // ============================================================

    /// Remove one installed rule. `rule_id` may be a full rule ID or a bare
    /// rule path; ref and variables are ignored when matching.
    pub fn remove(&self, rule_id: &str, config: &FormatConfig) -> Result<()> {
        match self.strategy().layout(config.is_user_rules) {
            Layout::SingleFile(relative) => self.remove_single(rule_id, config, &relative),
            Layout::Directory(relative) => self.remove_multi(rule_id, config, &relative),
        }
    }

    fn remove_single(&self, rule_id: &str, config: &FormatConfig, relative: &Path) -> Result<()> {
        let path = config.base_dir.join(relative);
        let Some(text) = base::read_optional(&path)? else {
            return Err(FormatError::RuleNotFound(rule_id.to_string()));
        };

        let sections = split_sections(&text);
        let mut removed = false;
        let kept: Vec<String> = sections
            .into_iter()
            .filter(|section| {
                let (id, _) = base::resolve_identity(section, None, "");
                let matched = !removed && matches_rule(rule_id, &id);
                removed |= matched;
                !matched
            })
            .collect();

        if !removed {
            return Err(FormatError::RuleNotFound(rule_id.to_string()));
        }

        if kept.is_empty() {
            base::remove_file(&path)?;
            info!(path = %path.display(), "Removed last rule, deleted rules file");
            return Ok(());
        }

        let generated_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let header = self.strategy().single_file_header(kept.len(), &generated_at);
        base::write_if_changed(&path, &format!("{}{}", header, render_body(&kept)))?;
        info!(rule_id, path = %path.display(), remaining = kept.len(), "Removed rule");
        Ok(())
    }

    fn remove_multi(&self, rule_id: &str, config: &FormatConfig, relative: &Path) -> Result<()> {
        let installed = self.list(config)?;
        let target = installed
            .iter()
            .find(|rule| matches_rule(rule_id, rule.id()))
            .ok_or_else(|| FormatError::RuleNotFound(rule_id.to_string()))?;

        let dir = config.base_dir.join(relative);
        let path = dir.join(&target.transformed.filename);
        base::remove_file(&path)?;
        info!(rule_id, path = %path.display(), "Removed rule file");

        // Prune the rules directory and its dot-directory if now empty.
        let mut current = Some(dir.as_path());
        while let Some(dir) = current {
            if dir == config.base_dir || !dir.starts_with(&config.base_dir) {
                break;
            }
            if !is_empty_dir(dir) {
                break;
            }
            base::remove_dir_if_empty(dir);
            current = dir.parent();
        }
        Ok(())
    }
}

fn load_custom_template(base: &BaseFormat, format_type: FormatType, path: &Path) -> Option<String> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            warn!(
                format = %format_type,
                path = %path.display(),
                error = %e,
                "Custom template unreadable, using built-in template"
            );
            return None;
        }
    };
    if let Err(e) = base.engine().validate(&source) {
        warn!(
            format = %format_type,
            path = %path.display(),
            error = %e,
            "Custom template invalid, using built-in template"
        );
        return None;
    }
    debug!(format = %format_type, path = %path.display(), "Loaded custom template");
    Some(source)
}

/// Two rules mapping to one file would overwrite each other; refuse the
/// whole batch instead.
fn check_unique_filenames(rules: &[TransformedRule]) -> Result<()> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for rule in rules {
        if let Some(first) = seen.insert(&rule.filename, &rule.rule.id) {
            return Err(FormatError::Constraint {
                rule_id: rule.rule.id.clone(),
                message: format!(
                    "file name {} is already used by {}",
                    rule.filename, first
                ),
            });
        }
    }
    Ok(())
}

/// Rendered content with its tracking comment appended.
fn tracked_content(rule: &TransformedRule) -> String {
    base::append_tracking_comment(
        &rule.content,
        &base::create_tracking_comment_with_defaults(&rule.rule),
    )
}

/// Everything after the header: the sections and the footer.
fn render_body(sections: &[String]) -> String {
    let mut body = String::new();
    for section in sections {
        body.push_str(SECTION_JOIN);
        body.push_str(section.trim());
    }
    body.push_str("\n\n");
    body.push_str(GENERATED_FOOTER);
    body.push('\n');
    body
}

/// Body of a previously written file, for comparison with [`render_body`].
fn existing_body(text: &str) -> Option<&str> {
    text.find(SECTION_JOIN).map(|start| &text[start..])
}

/// Sections of a single-file output, header and footer removed.
///
/// Rule content may itself contain `---` lines, so a chunk without a
/// tracking comment is joined onto the next one. Files with no tracking
/// comments at all are split naively.
pub(crate) fn split_sections(text: &str) -> Vec<String> {
    let chunks: Vec<&str> = text.split(SECTION_SEPARATOR).skip(1).collect();
    let tracked = chunks
        .iter()
        .any(|chunk| base::extract_rule_id(chunk).is_some());

    let mut sections = Vec::new();
    if !tracked {
        sections.extend(chunks.iter().map(|chunk| strip_footer(chunk)));
    } else {
        let mut pending: Vec<&str> = Vec::new();
        for chunk in chunks {
            pending.push(chunk);
            if base::extract_rule_id(chunk).is_some() {
                sections.push(strip_footer(&pending.join(SECTION_SEPARATOR)));
                pending.clear();
            }
        }
        if !pending.is_empty() {
            sections.push(strip_footer(&pending.join(SECTION_SEPARATOR)));
        }
    }

    sections.retain(|section| !section.is_empty());
    sections
}

fn strip_footer(section: &str) -> String {
    let trimmed = section.trim();
    trimmed
        .strip_suffix(GENERATED_FOOTER)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Whether an installed ID names the rule the caller asked for.
fn matches_rule(requested: &str, installed: &str) -> bool {
    let installed = ParsedRuleId::parse_lenient(installed);
    if is_rule_id(requested) {
        ParsedRuleId::parse_lenient(requested).same_rule(&installed)
    } else {
        installed.path == requested.trim().trim_matches('/')
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sections_rejoins_separators_inside_rules() {
        let text = "# Claude Rules\n\nheader\n\n---\n\n# A\n\nbefore\n---\nafter\n\n<!-- id: [contexture:a] -->\n\n---\n\n# B\n\n<!-- id: [contexture:b] -->\n\n*Generated by Contexture CLI*\n";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].contains("before\n---\nafter"));
        assert!(sections[0].ends_with("<!-- id: [contexture:a] -->"));
        assert_eq!(sections[1], "# B\n\n<!-- id: [contexture:b] -->");
    }

    #[test]
    fn test_split_sections_without_tracking_comments() {
        let text = "header\n---\n# A\n---\n# B\n\n*Generated by Contexture CLI*";
        assert_eq!(split_sections(text), vec!["# A", "# B"]);
    }

    #[test]
    fn test_split_sections_header_only() {
        assert!(split_sections("# Claude Rules\n\nnothing here").is_empty());
    }

    #[test]
    fn test_matches_rule() {
        assert!(matches_rule("[contexture:a/b]", "[contexture:a/b,v2]{\"x\":1}"));
        assert!(matches_rule("a/b", "[contexture:a/b]"));
        assert!(!matches_rule("[contexture(local):a/b]", "[contexture:a/b]"));
        assert!(!matches_rule("a/c", "[contexture:a/b]"));
    }

    #[test]
    fn test_existing_body_skips_header() {
        let body = render_body(&["# A".to_string()]);
        let file = format!("# Header\n\nGenerated at: now{}", body);
        assert_eq!(existing_body(&file), Some(body.as_str()));
    }
}
