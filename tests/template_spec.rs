use contexture::formats::base::BaseFormat;
use contexture::models::{FormatType, Rule};
use contexture::rule_id::Variables;
use contexture::template::{TemplateEngine, TemplateError};
use serde_json::json;
use speculate2::speculate;

fn vars(value: serde_json::Value) -> Variables {
    value.as_object().cloned().expect("object")
}

speculate! {
    before {
        let engine = TemplateEngine::new();
    }

    describe "render" {
        it "renders fields, conditionals and ranges" {
            let out = engine.render(
                "# {{.title}}\n{{range .items}}- {{.}}\n{{end}}{{if .extra}}extra{{end}}",
                &vars(json!({"title": "Go", "items": ["fmt", "vet"], "extra": false})),
            ).expect("render");
            assert_eq!(out, "# Go\n- fmt\n- vet\n");
        }

        it "does not escape HTML" {
            let out = engine.render("{{.code}}", &vars(json!({"code": "a < b && c > d"}))).expect("render");
            assert_eq!(out, "a < b && c > d");
        }

        it "exposes the helper functions" {
            let out = engine.render(
                "{{join_and .langs}}|{{slugify .title}}|{{.name | snake_case}}|{{default_if_empty \"n/a\" .missing}}|{{unique .dups | join \",\"}}",
                &vars(json!({
                    "langs": ["Go", "Rust", "Zig"],
                    "title": "Error Handling: Best Practices",
                    "name": "RuleName",
                    "dups": ["a", "b", "a"],
                })),
            ).expect("render");
            assert_eq!(out, "Go, Rust, and Zig|error-handling-best-practices|rule_name|n/a|a,b");
        }

        it "indents multi-line text" {
            let out = engine.render("{{indent 4 .body}}", &vars(json!({"body": "a\n\nb"}))).expect("render");
            assert_eq!(out, "    a\n\n    b");
        }

        it "rejects oversized indent widths and range counts" {
            let err = engine.render("{{indent 99999999999 .body}}", &vars(json!({"body": "a"}))).unwrap_err();
            assert!(matches!(err, TemplateError::Exec { .. }));

            let err = engine.render("{{range 99999999999}}x{{end}}", &Variables::new()).unwrap_err();
            assert!(matches!(err, TemplateError::Exec { .. }));

            let out = engine.render("{{range 3}}{{.}}{{end}}", &Variables::new()).expect("render");
            assert_eq!(out, "012");
        }

        it "reports parse errors with a truncated preview" {
            let source = format!("{{{{if .x}}}}{}", "y".repeat(200));
            let err = engine.render(&source, &Variables::new()).unwrap_err();
            assert!(matches!(err, TemplateError::Parse { .. }));
            assert!(err.preview().ends_with("..."));
            assert_eq!(err.preview().chars().count(), 103);
        }
    }

    describe "validate" {
        it "accepts well-formed templates" {
            assert!(engine.validate("{{with .a}}{{.b}}{{else}}none{{end}}").is_ok());
        }

        it "rejects trim markers followed by non-ASCII spacing" {
            assert!(engine.validate("{{-\u{00A0}.x}}").is_err());
            assert!(engine.validate("{{- .x -}}").is_ok());
        }

        it "rejects unknown functions" {
            assert!(engine.validate("{{shout .a}}").is_err());
        }
    }

    describe "extract_variables" {
        it "lists root names in first-seen order without duplicates" {
            let names = engine.extract_variables("{{.b.c}} {{.a}} {{if .b}}{{.d}}{{end}}");
            assert_eq!(names, vec!["b", "a", "d"]);
        }

        it "does not descend into with bodies" {
            let names = engine.extract_variables("{{with .user}}{{.name}}{{end}}{{.team}}");
            assert_eq!(names, vec!["user", "team"]);
        }

        it "returns nothing for templates that do not parse" {
            assert!(engine.extract_variables("{{if .x}}").is_empty());
        }
    }

    describe "rule variables" {
        before {
            let base = BaseFormat::new(FormatType::Claude);
        }

        it "treats the string false as falsy" {
            let rule = Rule {
                id: "[contexture:a]".into(),
                variables: vars(json!({"extended": "false"})),
                ..Default::default()
            };
            let out = base
                .process_template(&rule, "{{if .extended}}A{{else}}B{{end}}", &[])
                .expect("render");
            assert_eq!(out, "B");
        }

        it "treats yes as truthy and leaves other strings alone" {
            let rule = Rule {
                id: "[contexture:a]".into(),
                variables: vars(json!({"on": "YES", "name": "false-ish"})),
                ..Default::default()
            };
            let out = base
                .process_template(&rule, "{{if .on}}on{{end}} {{.name}}", &[])
                .expect("render");
            assert_eq!(out, "on false-ish");
        }

        it "lets extras override rule variables" {
            let rule = Rule {
                id: "[contexture:a]".into(),
                title: "Original".into(),
                ..Default::default()
            };
            let extras = vars(json!({"title": "Override"}));
            let out = base.process_template(&rule, "{{.title}}", &[&extras]).expect("render");
            assert_eq!(out, "Override");
        }

        it "exposes rule metadata" {
            let rule = Rule {
                id: "[contexture:a]".into(),
                tags: vec!["go".into(), "testing".into()],
                languages: vec!["go".into()],
                ..Default::default()
            };
            let out = base
                .process_template(&rule, "{{.id}} {{join \",\" .tags}} {{index .languages 0}}", &[])
                .expect("render");
            assert_eq!(out, "[contexture:a] go,testing go");
        }
    }
}
