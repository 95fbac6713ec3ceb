//! Text template engine for rule content and format wrappers.
//!
//! The syntax follows Go's `text/template`: `{{.field}}`, `{{if}}`,
//! `{{range}}`, `{{with}}`, pipelines and trim markers. Output is never
//! HTML-escaped since everything rendered here is Markdown or YAML.
//!
//! Each render parses into its own [`Template`], so calls share no mutable
//! state and can run concurrently.

mod exec;
mod funcs;
mod lexer;
mod parse;

use serde_json::Value;
use thiserror::Error;

use crate::rule_id::Variables;
use parse::{Node, Operand, Pipeline};

const PREVIEW_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to {operation} template: {message} (template: {preview:?})")]
    Parse {
        operation: &'static str,
        message: String,
        preview: String,
    },

    #[error("failed to execute template during {operation}: {message} (template: {preview:?})")]
    Exec {
        operation: &'static str,
        message: String,
        preview: String,
    },
}

impl TemplateError {
    pub fn preview(&self) -> &str {
        match self {
            Self::Parse { preview, .. } | Self::Exec { preview, .. } => preview,
        }
    }
}

/// First [`PREVIEW_LEN`] characters of a template for error messages.
pub fn preview(source: &str) -> String {
    let mut chars = source.chars();
    let head: String = chars.by_ref().take(PREVIEW_LEN).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
    preview: String,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Self::parse_for(source, "parse")
    }

    fn parse_for(source: &str, operation: &'static str) -> Result<Self, TemplateError> {
        let to_err = |message: String| TemplateError::Parse {
            operation,
            message,
            preview: preview(source),
        };
        let segments = lexer::lex(source).map_err(to_err)?;
        let nodes = parse::parse(segments).map_err(to_err)?;
        Ok(Self {
            nodes,
            preview: preview(source),
        })
    }

    pub fn execute(&self, vars: &Variables) -> Result<String, TemplateError> {
        exec::execute(&self.nodes, &Value::Object(vars.clone())).map_err(|message| {
            TemplateError::Exec {
                operation: "render",
                message,
                preview: self.preview.clone(),
            }
        })
    }

    /// Root variable names referenced, deduplicated in order of first use.
    ///
    /// `.a.b.c` contributes `a`. The body of a `with` or `range` block is
    /// skipped because dot is rebound there; the block's own pipeline is
    /// still recorded.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_nodes(&self.nodes, &mut names);
        names
    }
}

fn collect_nodes(nodes: &[Node], names: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Action(pipe) => collect_pipeline(pipe, names),
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    collect_pipeline(&branch.pipe, names);
                    collect_nodes(&branch.body, names);
                }
                if let Some(otherwise) = otherwise {
                    collect_nodes(otherwise, names);
                }
            }
            Node::With { branch, otherwise } | Node::Range { branch, otherwise } => {
                collect_pipeline(&branch.pipe, names);
                if let Some(otherwise) = otherwise {
                    collect_nodes(otherwise, names);
                }
            }
        }
    }
}

fn collect_pipeline(pipe: &Pipeline, names: &mut Vec<String>) {
    for command in &pipe.commands {
        for operand in &command.args {
            let root = match operand {
                Operand::Field(fields) => fields.first(),
                Operand::Variable(name, fields) if name == "$" => fields.first(),
                Operand::Pipeline(inner) => {
                    collect_pipeline(inner, names);
                    None
                }
                _ => None,
            };
            if let Some(root) = root {
                if !names.contains(root) {
                    names.push(root.clone());
                }
            }
        }
    }
}

/// Stateless entry point used by the format layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, source: &str, vars: &Variables) -> Result<String, TemplateError> {
        Template::parse_for(source, "parse")?.execute(vars)
    }

    pub fn validate(&self, source: &str) -> Result<(), TemplateError> {
        Template::parse_for(source, "validate").map(|_| ())
    }

    /// Returns an empty list for templates that do not parse.
    pub fn extract_variables(&self, source: &str) -> Vec<String> {
        match Template::parse(source) {
            Ok(template) => template.variables(),
            Err(e) => {
                tracing::debug!(error = %e, "Cannot extract variables from unparsable template");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn render(source: &str, data: Value) -> String {
        TemplateEngine::new().render(source, &vars(data)).unwrap()
    }

    #[test]
    fn test_no_html_escaping() {
        assert_eq!(render("{{.x}}", json!({"x": "<a & b>"})), "<a & b>");
    }

    #[test]
    fn test_missing_key_renders_empty() {
        assert_eq!(render("[{{.missing.deep}}]", json!({})), "[]");
    }

    #[test]
    fn test_else_if_chain() {
        let t = "{{if eq .n 1}}one{{else if eq .n 2}}two{{else}}many{{end}}";
        assert_eq!(render(t, json!({"n": 1})), "one");
        assert_eq!(render(t, json!({"n": 2})), "two");
        assert_eq!(render(t, json!({"n": 7})), "many");
    }

    #[test]
    fn test_range_with_index() {
        let t = "{{range $i, $v := .items}}{{$i}}={{$v}};{{else}}none{{end}}";
        assert_eq!(render(t, json!({"items": ["a", "b"]})), "0=a;1=b;");
        assert_eq!(render(t, json!({"items": []})), "none");
    }

    #[test]
    fn test_with_rebinds_dot() {
        let t = "{{with .user}}{{.name}} ({{$.team}}){{else}}anon{{end}}";
        assert_eq!(render(t, json!({"user": {"name": "ada"}, "team": "core"})), "ada (core)");
        assert_eq!(render(t, json!({})), "anon");
    }

    #[test]
    fn test_pipelines_and_parens() {
        assert_eq!(
            render(r#"{{.tags | unique | join ", "}}"#, json!({"tags": ["a", "b", "a"]})),
            "a, b"
        );
        assert_eq!(render("{{upper (print .a .b)}}", json!({"a": "x", "b": "y"})), "XY");
    }

    #[test]
    fn test_variable_declaration_and_assignment() {
        let t = "{{$x := 1}}{{if .flag}}{{$x = 2}}{{end}}{{$x}}";
        assert_eq!(render(t, json!({"flag": true})), "2");
        assert_eq!(render(t, json!({"flag": false})), "1");
    }

    #[test]
    fn test_parse_errors() {
        let engine = TemplateEngine::new();
        assert!(engine.validate("{{if .x}}open").is_err());
        assert!(engine.validate("{{end}}").is_err());
        assert!(engine.validate("{{nosuchfunc .x}}").is_err());
        assert!(engine.validate("{{$undeclared}}").is_err());
        assert!(engine.validate("{{.x .y}}").is_err());
    }

    #[test]
    fn test_exec_error_carries_preview() {
        let long = format!("{{{{.x.y}}}}{}", "z".repeat(200));
        let err = TemplateEngine::new()
            .render(&long, &vars(json!({"x": "str"})))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Exec { .. }));
        assert_eq!(err.preview().chars().count(), PREVIEW_LEN + 3);
    }

    #[test]
    fn test_extract_variables() {
        let engine = TemplateEngine::new();
        let names = engine.extract_variables(
            "{{.b.c}} {{if .a}}{{.b}}{{.d}}{{end}}{{with .x}}{{.inner}}{{end}}{{$.e}}",
        );
        assert_eq!(names, vec!["b", "a", "d", "x", "e"]);
    }
}
