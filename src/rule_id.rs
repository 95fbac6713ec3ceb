//! Rule identifier codec.
//!
//! Rules are addressed with a bracketed syntax:
//!
//! ```text
//! [contexture(source):path/to/rule,ref]{"variable":"value"}
//! ```
//!
//! The source and ref are optional. An omitted source means the default rule
//! repository, an omitted ref means [`DEFAULT_REF`]. Both defaults are dropped
//! again when formatting so tracking comments stay minimal.

use serde_json::{Map, Value};
use thiserror::Error;

/// Default rule repository used when an ID carries no `(source)`.
pub const DEFAULT_SOURCE: &str = "https://github.com/contexture-dev/rules.git";

/// Reserved source label for rules that were not fetched from git.
pub const LOCAL_SOURCE: &str = "local";

/// Branch assumed when an ID carries no `,ref`.
pub const DEFAULT_REF: &str = "main";

const PREFIX: &str = "[contexture";

/// Template variables bound to a rule. Keys are kept sorted, so serializing a
/// map always yields the same bytes for the same contents.
pub type Variables = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RuleIdError {
    #[error("rule ID is empty")]
    Empty,

    #[error("rule ID must start with '[contexture': {0}")]
    MissingPrefix(String),

    #[error("rule ID has an unterminated {what}: {raw}")]
    Unterminated { what: &'static str, raw: String },

    #[error("rule ID has unexpected character '{found}' at offset {offset}: {raw}")]
    Unexpected {
        found: char,
        offset: usize,
        raw: String,
    },

    #[error("rule ID has an empty path: {0}")]
    EmptyPath(String),

    #[error("rule ID path may not contain '..' segments: {0}")]
    ParentSegment(String),

    #[error("rule ID variables are not valid JSON: {0}")]
    InvalidVariables(#[from] serde_json::Error),

    #[error("rule ID variables must be a JSON object")]
    VariablesNotObject,
}

/// Structured form of a rule ID.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRuleId {
    pub source: String,
    /// Slash-separated logical path with no leading or trailing slash.
    pub path: String,
    pub git_ref: String,
    pub variables: Variables,
}

impl ParsedRuleId {
    /// Build an ID for the default repository at the default ref.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            path: normalize_path(&path.into()),
            git_ref: DEFAULT_REF.to_string(),
            variables: Variables::new(),
        }
    }

    /// Build an ID for a rule that lives outside any git repository.
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            source: LOCAL_SOURCE.to_string(),
            ..Self::new(path)
        }
    }

    /// Parse the bracketed syntax.
    pub fn parse(raw: &str) -> Result<Self, RuleIdError> {
        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() {
            return Err(RuleIdError::Empty);
        }
        let rest = raw_trimmed
            .strip_prefix(PREFIX)
            .ok_or_else(|| RuleIdError::MissingPrefix(raw.to_string()))?;

        let (source, rest) = if let Some(after_paren) = rest.strip_prefix('(') {
            let close = after_paren.find(')').ok_or_else(|| RuleIdError::Unterminated {
                what: "source",
                raw: raw.to_string(),
            })?;
            (after_paren[..close].trim(), &after_paren[close + 1..])
        } else {
            ("", rest)
        };

        let Some(rest) = rest.strip_prefix(':') else {
            let found = rest.chars().next().unwrap_or(' ');
            return Err(RuleIdError::Unexpected {
                found,
                offset: raw_trimmed.len() - rest.len(),
                raw: raw.to_string(),
            });
        };

        let close = rest.find(']').ok_or_else(|| RuleIdError::Unterminated {
            what: "bracket",
            raw: raw.to_string(),
        })?;
        let body = &rest[..close];
        let tail = rest[close + 1..].trim();

        let (path, git_ref) = match body.rsplit_once(',') {
            Some((path, git_ref)) => (path, git_ref.trim()),
            None => (body, ""),
        };

        if path.split('/').any(|segment| segment.trim() == "..") {
            return Err(RuleIdError::ParentSegment(raw.to_string()));
        }
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(RuleIdError::EmptyPath(raw.to_string()));
        }

        let variables = if tail.is_empty() {
            Variables::new()
        } else {
            if !tail.starts_with('{') {
                return Err(RuleIdError::Unexpected {
                    found: tail.chars().next().unwrap_or(' '),
                    offset: raw_trimmed.len() - tail.len(),
                    raw: raw.to_string(),
                });
            }
            match serde_json::from_str::<Value>(tail)? {
                Value::Object(map) => map,
                _ => return Err(RuleIdError::VariablesNotObject),
            }
        };

        Ok(Self {
            source: if source.is_empty() {
                DEFAULT_SOURCE.to_string()
            } else {
                source.to_string()
            },
            path,
            git_ref: if git_ref.is_empty() {
                DEFAULT_REF.to_string()
            } else {
                git_ref.to_string()
            },
            variables,
        })
    }

    /// Parse, falling back to an opaque local ID whose path is the sanitized
    /// raw string. Used when reading content written by older tools.
    pub fn parse_lenient(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|_| Self::opaque(raw))
    }

    /// Treat an arbitrary string as an opaque local rule path.
    pub fn opaque(raw: &str) -> Self {
        let sanitized: String = raw
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let path = normalize_path(&sanitized);
        Self::local(if path.is_empty() { "unknown".to_string() } else { path })
    }

    pub fn is_default_source(&self) -> bool {
        self.source.is_empty() || self.source == DEFAULT_SOURCE
    }

    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }

    /// Two IDs name the same rule when source and path match. Ref and
    /// variables select a revision or binding, not a different rule.
    pub fn same_rule(&self, other: &Self) -> bool {
        self.path == other.path && self.is_default_source() == other.is_default_source() && {
            self.is_default_source() || self.source == other.source
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Last path segment, handy as a display fallback.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Serialize back to the bracketed syntax.
    pub fn format(&self) -> String {
        let mut out = String::from(PREFIX);
        if !self.is_default_source() {
            out.push('(');
            out.push_str(&self.source);
            out.push(')');
        }
        out.push(':');
        out.push_str(&self.path);
        if !self.git_ref.is_empty() && self.git_ref != DEFAULT_REF {
            out.push(',');
            out.push_str(&self.git_ref);
        }
        out.push(']');
        if !self.variables.is_empty() {
            out.push_str(&Value::Object(self.variables.clone()).to_string());
        }
        out
    }
}

impl std::fmt::Display for ParsedRuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

impl std::str::FromStr for ParsedRuleId {
    type Err = RuleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Cheap syntactic check, no full parse.
pub fn is_rule_id(raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with(PREFIX) && raw.contains(']')
}

/// Normalized paths hold no `.`/`..` segments and none of the characters that
/// delimit the ref, so they format and parse back unchanged.
fn normalize_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(|segment| {
            segment
                .chars()
                .map(|c| if matches!(c, ',' | '[' | ']' | '\\') { '_' } else { c })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal() {
        let id = ParsedRuleId::parse("[contexture:languages/go/testing]").unwrap();
        assert_eq!(id.source, DEFAULT_SOURCE);
        assert_eq!(id.path, "languages/go/testing");
        assert_eq!(id.git_ref, DEFAULT_REF);
        assert!(id.variables.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let id = ParsedRuleId::parse(
            r#"[contexture(git@github.com:acme/rules.git):/security/secrets/,v2]{"strict":true}"#,
        )
        .unwrap();
        assert_eq!(id.source, "git@github.com:acme/rules.git");
        assert_eq!(id.path, "security/secrets");
        assert_eq!(id.git_ref, "v2");
        assert_eq!(id.variables.get("strict"), Some(&json!(true)));
    }

    #[test]
    fn test_format_drops_defaults() {
        let id = ParsedRuleId::parse("[contexture(https://github.com/contexture-dev/rules.git):a/b,main]")
            .unwrap();
        assert_eq!(id.format(), "[contexture:a/b]");
    }

    #[test]
    fn test_format_sorts_variable_keys() {
        let id = ParsedRuleId::parse(r#"[contexture:a]{"zeta":1,"alpha":{"y":2,"x":1}}"#).unwrap();
        assert_eq!(id.format(), r#"[contexture:a]{"alpha":{"x":1,"y":2},"zeta":1}"#);
    }

    #[test]
    fn test_malformed_ids() {
        assert!(matches!(ParsedRuleId::parse(""), Err(RuleIdError::Empty)));
        assert!(matches!(
            ParsedRuleId::parse("contexture:a"),
            Err(RuleIdError::MissingPrefix(_))
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture:a/b"),
            Err(RuleIdError::Unterminated { .. })
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture(local:a]"),
            Err(RuleIdError::Unterminated { what: "source", .. })
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture(local)a]"),
            Err(RuleIdError::Unexpected { found: 'a', .. })
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture:/]"),
            Err(RuleIdError::EmptyPath(_))
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture:a][1]"),
            Err(RuleIdError::Unexpected { .. })
        ));
        assert!(matches!(
            ParsedRuleId::parse("[contexture:a]{nope"),
            Err(RuleIdError::InvalidVariables(_))
        ));
    }

    #[test]
    fn test_lenient_fallback_sanitizes() {
        let id = ParsedRuleId::parse_lenient("my rule: v1!");
        assert_eq!(id.source, LOCAL_SOURCE);
        assert_eq!(id.path, "my_rule__v1_");
    }

    #[test]
    fn test_same_rule_ignores_ref_and_variables() {
        let a = ParsedRuleId::parse(r#"[contexture:x/y,dev]{"a":1}"#).unwrap();
        let b = ParsedRuleId::parse("[contexture:x/y]").unwrap();
        let c = ParsedRuleId::parse("[contexture(local):x/y]").unwrap();
        assert!(a.same_rule(&b));
        assert!(!a.same_rule(&c));
    }
}
