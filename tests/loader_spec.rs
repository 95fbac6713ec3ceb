use std::fs;

use contexture::loader::{LoaderError, LocalRuleLoader};
use contexture::models::TriggerType;
use contexture::rule_id::{ParsedRuleId, RuleIdError, Variables, DEFAULT_SOURCE};
use serde_json::json;
use speculate2::speculate;
use tempfile::TempDir;

const GO_TESTING: &str = "---
title: Go Testing
description: Table-driven tests
tags: [go, testing]
languages:
  - go
trigger:
  type: glob
  globs: [\"*_test.go\"]
variables:
  runner: go test
  parallel: true
---

Run tests with `{{.runner}}`.
";

speculate! {
    before {
        let tmp = TempDir::new().expect("temp dir");
        let rules_dir = tmp.path().join("rules");
        fs::create_dir_all(rules_dir.join("languages/go")).expect("mkdir");
        fs::write(rules_dir.join("languages/go/testing.md"), GO_TESTING).expect("seed");
        let loader = LocalRuleLoader::new(&rules_dir);
    }

    describe "load" {
        it "reads front-matter and body" {
            let rule = loader.load("[contexture:languages/go/testing]", &Variables::new()).expect("load");
            assert_eq!(rule.id, "[contexture:languages/go/testing]");
            assert_eq!(rule.title, "Go Testing");
            assert_eq!(rule.description, "Table-driven tests");
            assert_eq!(rule.tags, vec!["go", "testing"]);
            assert_eq!(rule.languages, vec!["go"]);
            assert_eq!(rule.content, "Run tests with `{{.runner}}`.");
            assert_eq!(rule.source, DEFAULT_SOURCE);
            assert_eq!(rule.git_ref, "main");

            let trigger = rule.trigger.expect("trigger");
            assert_eq!(trigger.trigger_type, TriggerType::Glob);
            assert_eq!(trigger.globs, vec!["*_test.go"]);
        }

        it "keeps front-matter variables as defaults" {
            let rule = loader.load("[contexture:languages/go/testing]", &Variables::new()).expect("load");
            assert_eq!(rule.default_variables.get("runner"), Some(&json!("go test")));
            assert!(rule.variables.is_empty());
            assert_eq!(rule.effective_variables().get("parallel"), Some(&json!(true)));
        }

        it "layers ID variables and overrides over the defaults" {
            let overrides = json!({"parallel": false}).as_object().cloned().unwrap();
            let rule = loader
                .load(r#"[contexture:languages/go/testing]{"runner":"gotestsum"}"#, &overrides)
                .expect("load");
            assert_eq!(rule.id, "[contexture:languages/go/testing]");
            assert_eq!(rule.variables.get("runner"), Some(&json!("gotestsum")));
            assert_eq!(rule.variables.get("parallel"), Some(&json!(false)));
            assert_eq!(rule.non_default_variables().len(), 2);
        }

        it "keeps the source of local rules" {
            let rule = loader.load("[contexture(local):languages/go/testing]", &Variables::new()).expect("load");
            assert_eq!(rule.id, "[contexture(local):languages/go/testing]");
            assert_eq!(rule.source, "local");
        }

        it "takes the title from the first heading" {
            fs::write(rules_dir.join("plain.md"), "# Plain Rule\n\nJust text.\n").expect("seed");
            let rule = loader.load("[contexture:plain]", &Variables::new()).expect("load");
            assert_eq!(rule.title, "Plain Rule");
            assert_eq!(rule.content, "Just text.");
        }

        it "falls back to the last path segment" {
            fs::write(rules_dir.join("languages/go/naming.md"), "No heading.").expect("seed");
            let rule = loader.load("[contexture:languages/go/naming]", &Variables::new()).expect("load");
            assert_eq!(rule.title, "naming");
            assert_eq!(rule.content, "No heading.");
        }

        it "reports missing rules" {
            let err = loader.load("[contexture:nope]", &Variables::new()).unwrap_err();
            assert!(matches!(err, LoaderError::NotFound(_)));
        }

        it "reports invalid IDs" {
            let err = loader.load("nope", &Variables::new()).unwrap_err();
            assert!(matches!(err, LoaderError::InvalidId(_)));
        }

        it "never reads outside the rules directory" {
            fs::write(tmp.path().join("secret.md"), "# Secret\n\nhidden").expect("seed");
            let err = loader.load("[contexture:../secret]", &Variables::new()).unwrap_err();
            assert!(matches!(err, LoaderError::InvalidId(RuleIdError::ParentSegment(_))));
        }

        it "keeps hand-built paths inside the rules directory" {
            let id = ParsedRuleId {
                path: "../../secret".into(),
                ..ParsedRuleId::new("placeholder")
            };
            assert_eq!(loader.rule_path(&id), rules_dir.join("secret.md"));
        }

        it "reports broken front-matter" {
            fs::write(rules_dir.join("bad.md"), "---\ntags: [unclosed\n---\nbody").expect("seed");
            let err = loader.load("[contexture:bad]", &Variables::new()).unwrap_err();
            assert!(matches!(err, LoaderError::FrontMatter { .. }));
        }
    }
}
