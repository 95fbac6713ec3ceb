//! Primitives shared by every output format: validation, template variable
//! assembly, tracking comments, title extraction, hashing and filesystem
//! helpers.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::models::{FormatType, Rule, ValidationResult};
use crate::rule_id::{ParsedRuleId, Variables};
use crate::template::TemplateEngine;

pub const TRACKING_COMMENT_PREFIX: &str = "<!-- id: ";
pub const TRACKING_COMMENT_SUFFIX: &str = " -->";

/// How an installed rule's ID was recovered, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Parsed from the tracking comment written with the rule.
    TrackingComment,
    /// Derived from the file name; not invertible for nested paths.
    Filename,
    /// Neither was available; the ID is a label only.
    Opaque,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackingComment => "tracking_comment",
            Self::Filename => "filename",
            Self::Opaque => "opaque",
        }
    }
}

/// Shared services bound to one format.
#[derive(Debug, Clone)]
pub struct BaseFormat {
    format_type: FormatType,
    engine: TemplateEngine,
}

impl BaseFormat {
    pub fn new(format_type: FormatType) -> Self {
        Self {
            format_type,
            engine: TemplateEngine::new(),
        }
    }

    pub fn format_type(&self) -> FormatType {
        self.format_type
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Structural checks common to every format. Missing ID, title or
    /// content are errors; missing description or tags are warnings.
    pub fn validate_rule(&self, rule: &Rule) -> ValidationResult {
        let mut result = ValidationResult::new().with_metadata("format", self.format_type.as_str());

        if rule.id.trim().is_empty() {
            result.add_error("id", "Rule ID is required", "REQUIRED_FIELD");
        }
        if rule.title.trim().is_empty() {
            result.add_error("title", "Rule title is required", "REQUIRED_FIELD");
        }
        if rule.content.trim().is_empty() {
            result.add_error("content", "Rule content is required", "REQUIRED_FIELD");
        }
        if rule.description.trim().is_empty() {
            result.add_warning("description", "Rule has no description", "MISSING_DESCRIPTION");
        }
        if rule.tags.is_empty() {
            result.add_warning("tags", "Rule has no tags", "MISSING_TAGS");
        }

        result
    }

    /// Render `template` against the rule's variables, overlaid by `extras`
    /// in order.
    pub fn process_template(
        &self,
        rule: &Rule,
        template: &str,
        extras: &[&Variables],
    ) -> Result<String> {
        self.render_with(
            "processing template",
            rule,
            &rule.effective_variables(),
            template,
            extras,
        )
    }

    /// Like [`process_template`](Self::process_template) but with explicit
    /// bindings in place of the rule's own. `stage` labels template errors.
    pub fn render_with(
        &self,
        stage: &'static str,
        rule: &Rule,
        bindings: &Variables,
        template: &str,
        extras: &[&Variables],
    ) -> Result<String> {
        let mut vars = template_variables(rule, bindings);
        for extra in extras {
            for (key, value) in extra.iter() {
                vars.insert(key.clone(), value.clone());
            }
        }
        self.engine
            .render(template, &vars)
            .map_err(FormatError::template(stage))
    }
}

/// Base variable set for a rule: its metadata, then `bindings` with
/// boolean-looking strings coerced so `"false"` is falsy in conditionals.
pub fn template_variables(rule: &Rule, bindings: &Variables) -> Variables {
    let mut vars = Variables::new();
    vars.insert("id".into(), Value::String(rule.id.clone()));
    vars.insert("title".into(), Value::String(rule.title.clone()));
    vars.insert("description".into(), Value::String(rule.description.clone()));
    vars.insert("tags".into(), string_list(&rule.tags));
    vars.insert("content".into(), Value::String(rule.content.clone()));
    vars.insert("source".into(), Value::String(rule.source.clone()));
    vars.insert("ref".into(), Value::String(rule.git_ref.clone()));
    vars.insert("languages".into(), string_list(&rule.languages));
    vars.insert("frameworks".into(), string_list(&rule.frameworks));
    vars.insert(
        "trigger".into(),
        rule.trigger
            .as_ref()
            .map(|t| t.to_value())
            .unwrap_or(Value::Null),
    );

    for (key, value) in bindings {
        vars.insert(key.clone(), coerce_bool(value));
    }
    vars
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// `"true"`/`"1"`/`"yes"` and `"false"`/`"0"`/`"no"` (any case) become
/// booleans; everything else is returned unchanged.
pub fn coerce_bool(value: &Value) -> Value {
    if let Value::String(s) = value {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => return Value::Bool(true),
            "false" | "0" | "no" => return Value::Bool(false),
            _ => {}
        }
    }
    value.clone()
}

/// File name for a rule: its path with `/` replaced by `-`, anything outside
/// `[A-Za-z0-9._-]` replaced by `_`, plus `extension` (including the dot).
/// Rules from a non-default source get a short hash of the source appended,
/// so the same path from two sources maps to two files.
pub fn generate_filename(rule_id: &str, extension: &str) -> String {
    let (path, source_suffix) = match ParsedRuleId::parse(rule_id) {
        Ok(id) if id.is_default_source() => (id.path, None),
        Ok(id) => {
            let suffix = content_hash(&id.source)[..SOURCE_SUFFIX_LEN].to_string();
            (id.path, Some(suffix))
        }
        Err(_) => (rule_id.trim().trim_matches('/').to_string(), None),
    };
    let slug: String = path
        .replace('/', "-")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = if slug.is_empty() { "rule".to_string() } else { slug };
    match source_suffix {
        Some(suffix) => format!("{}-{}{}", slug, suffix, extension),
        None => format!("{}{}", slug, extension),
    }
}

const SOURCE_SUFFIX_LEN: usize = 8;

/// `<!-- id: RULEID -->` with `variables` embedded as sorted JSON when
/// non-empty. Unparsable IDs are embedded verbatim.
pub fn create_tracking_comment(rule_id: &str, variables: &Variables) -> String {
    let id = match ParsedRuleId::parse(rule_id) {
        Ok(parsed) => parsed.with_variables(variables.clone()).format(),
        Err(_) => rule_id.trim().to_string(),
    };
    format!("{}{}{}", TRACKING_COMMENT_PREFIX, id, TRACKING_COMMENT_SUFFIX)
}

/// Tracking comment embedding only the variables that differ from the rule's
/// declared defaults, so unchanged rules regenerate byte-identically.
pub fn create_tracking_comment_with_defaults(rule: &Rule) -> String {
    create_tracking_comment(&rule.id, &rule.non_default_variables())
}

/// Append the comment after the content, separated by a blank line. The
/// comment goes last so heading-based title extraction is unaffected.
pub fn append_tracking_comment(content: &str, comment: &str) -> String {
    let body = content.trim_end();
    if body.is_empty() {
        return comment.to_string();
    }
    format!("{}\n\n{}", body, comment)
}

/// Rule ID inside a single tracking comment line, if it is one.
pub fn parse_tracking_comment(line: &str) -> Option<String> {
    let inner = line
        .trim()
        .strip_prefix(TRACKING_COMMENT_PREFIX)?
        .strip_suffix(TRACKING_COMMENT_SUFFIX)?
        .trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

/// All tracking comment IDs in `content`, in order.
pub fn extract_tracking_comments(content: &str) -> Vec<String> {
    content.lines().filter_map(parse_tracking_comment).collect()
}

/// Last tracking comment in `content`. Comments are appended, so the last
/// one belongs to the block that ends here.
pub fn extract_rule_id(content: &str) -> Option<String> {
    content.lines().rev().find_map(parse_tracking_comment)
}

pub fn strip_tracking_comments(content: &str) -> String {
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| parse_tracking_comment(line).is_none())
        .collect();
    kept.join("\n").trim_end().to_string()
}

/// Text of the first `# ` heading, skipping any leading YAML front-matter.
pub fn extract_title(content: &str) -> Option<String> {
    let body = skip_front_matter(content);
    body.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

fn skip_front_matter(content: &str) -> &str {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix("---\n") else {
        return content;
    };
    match rest.find("\n---") {
        Some(end) => &rest[end + 4..],
        None => content,
    }
}

/// Recover a rule ID from generated text, falling back to the file name and
/// then to an opaque label.
pub fn resolve_identity(
    text: &str,
    filename_stem: Option<&str>,
    label: &str,
) -> (String, IdentitySource) {
    if let Some(raw) = extract_rule_id(text) {
        let id = match ParsedRuleId::parse(&raw) {
            Ok(parsed) => parsed.format(),
            Err(_) => ParsedRuleId::opaque(&raw).format(),
        };
        return (id, IdentitySource::TrackingComment);
    }
    if let Some(stem) = filename_stem.filter(|s| !s.is_empty()) {
        return (ParsedRuleId::local(stem).format(), IdentitySource::Filename);
    }
    (ParsedRuleId::opaque(label).format(), IdentitySource::Opaque)
}

/// SHA-256 over the raw bytes, hex encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================
// Filesystem helpers
// ============================================================

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(FormatError::io("create output directory", path))
}

/// Read a file, treating "not found" as `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FormatError::io("read file", path)(e)),
    }
}

/// Write `content` unless the file already holds exactly that. Returns
/// whether the file was written.
pub fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if read_optional(path)?.as_deref() == Some(content) {
        debug!(path = %path.display(), "Output unchanged, skipping write");
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content).map_err(FormatError::io("write file", path))?;
    Ok(true)
}

pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(FormatError::io("remove file", path))
}

/// Remove a directory if it is empty. Failures are logged and ignored since
/// the directory may already be gone or still hold other files.
pub fn remove_dir_if_empty(path: &Path) {
    if let Err(e) = fs::remove_dir(path) {
        debug!(path = %path.display(), error = %e, "Directory not removed");
    }
}

pub fn modified_time(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = fs::metadata(path).map_err(FormatError::io("stat file", path))?;
    let modified = metadata
        .modified()
        .map_err(FormatError::io("read modification time of", path))?;
    Ok(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_generate_filename() {
        assert_eq!(
            generate_filename("[contexture:languages/go/testing]", ".md"),
            "languages-go-testing.md"
        );
        assert_eq!(
            generate_filename("[contexture(local):my rules/x@y]", ".mdc"),
            format!("my_rules-x_y-{}.mdc", &content_hash("local")[..8])
        );
        assert_ne!(
            generate_filename("[contexture(git@host:a.git):x]", ".md"),
            generate_filename("[contexture(git@host:b.git):x]", ".md")
        );
        assert_eq!(generate_filename("legacy/rule name", ".md"), "legacy-rule_name.md");
    }

    #[test]
    fn test_tracking_comment_roundtrip() {
        let comment = create_tracking_comment(
            "[contexture:a/b]",
            &vars(json!({"zeta": "z", "alpha": true})),
        );
        assert_eq!(
            comment,
            r#"<!-- id: [contexture:a/b]{"alpha":true,"zeta":"z"} -->"#
        );
        assert_eq!(
            parse_tracking_comment(&comment).as_deref(),
            Some(r#"[contexture:a/b]{"alpha":true,"zeta":"z"}"#)
        );
        assert_eq!(parse_tracking_comment("<!-- other -->"), None);
    }

    #[test]
    fn test_tracking_comment_replaces_embedded_variables() {
        let comment = create_tracking_comment(r#"[contexture:a]{"old":1}"#, &Variables::new());
        assert_eq!(comment, "<!-- id: [contexture:a] -->");
    }

    #[test]
    fn test_tracking_comment_with_defaults_omits_defaults() {
        let rule = Rule {
            id: "[contexture:a]".into(),
            variables: vars(json!({"same": 1, "changed": "x"})),
            default_variables: vars(json!({"same": 1, "changed": "y"})),
            ..Default::default()
        };
        assert_eq!(
            create_tracking_comment_with_defaults(&rule),
            r#"<!-- id: [contexture:a]{"changed":"x"} -->"#
        );
    }

    #[test]
    fn test_extract_title_skips_front_matter() {
        let text = "---\ndescription: x\n# not a title\n---\n\n# Real Title\n\nbody";
        assert_eq!(extract_title(text).as_deref(), Some("Real Title"));
        assert_eq!(extract_title("no heading"), None);
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(coerce_bool(&json!("FALSE")), json!(false));
        assert_eq!(coerce_bool(&json!("yes")), json!(true));
        assert_eq!(coerce_bool(&json!("0")), json!(false));
        assert_eq!(coerce_bool(&json!("maybe")), json!("maybe"));
        assert_eq!(coerce_bool(&json!(0)), json!(0));
    }

    #[test]
    fn test_resolve_identity_tiers() {
        let (id, tier) = resolve_identity("# T\n\n<!-- id: [contexture:x/y] -->", Some("x-y"), "T");
        assert_eq!((id.as_str(), tier), ("[contexture:x/y]", IdentitySource::TrackingComment));

        let (id, tier) = resolve_identity("# T", Some("x-y"), "T");
        assert_eq!((id.as_str(), tier), ("[contexture(local):x-y]", IdentitySource::Filename));

        let (id, tier) = resolve_identity("text", None, "Some Title");
        assert_eq!((id.as_str(), tier), ("[contexture(local):Some_Title]", IdentitySource::Opaque));
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
