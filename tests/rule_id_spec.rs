use contexture::rule_id::{is_rule_id, ParsedRuleId, RuleIdError, Variables, DEFAULT_SOURCE};
use serde_json::json;
use speculate2::speculate;

fn vars(value: serde_json::Value) -> Variables {
    value.as_object().cloned().expect("object")
}

speculate! {
    describe "parse" {
        it "fills in the default source and ref" {
            let id = ParsedRuleId::parse("[contexture:languages/go/testing]").expect("parse");
            assert_eq!(id.source, DEFAULT_SOURCE);
            assert_eq!(id.path, "languages/go/testing");
            assert_eq!(id.git_ref, "main");
            assert!(id.variables.is_empty());
        }

        it "reads source, ref and variables" {
            let id = ParsedRuleId::parse(
                r#"[contexture(https://example.com/rules.git):security/owasp,v2]{"level":3,"strict":true}"#,
            ).expect("parse");
            assert_eq!(id.source, "https://example.com/rules.git");
            assert_eq!(id.path, "security/owasp");
            assert_eq!(id.git_ref, "v2");
            assert_eq!(id.variables, vars(json!({"level": 3, "strict": true})));
        }

        it "rejects malformed IDs" {
            assert!(matches!(ParsedRuleId::parse(""), Err(RuleIdError::Empty)));
            assert!(matches!(ParsedRuleId::parse("languages/go"), Err(RuleIdError::MissingPrefix(_))));
            assert!(ParsedRuleId::parse("[contexture:]").is_err());
            assert!(ParsedRuleId::parse("[contexture:a/b").is_err());
            assert!(ParsedRuleId::parse("[contexture:a]{not json}").is_err());
            assert!(matches!(
                ParsedRuleId::parse("[contexture:a][1,2]"),
                Err(RuleIdError::Unexpected { found: '[', .. })
            ));
        }
    }

    describe "format" {
        it "omits the default source and ref" {
            let id = ParsedRuleId::new("core/style");
            assert_eq!(id.format(), "[contexture:core/style]");
        }

        it "sorts variable keys" {
            let id = ParsedRuleId::local("x")
                .with_variables(vars(json!({"zeta": 1, "alpha": {"b": 2, "a": 1}})));
            assert_eq!(
                id.format(),
                r#"[contexture(local):x]{"alpha":{"a":1,"b":2},"zeta":1}"#
            );
        }

        it "round-trips every ID it produces" {
            let ids = [
                ParsedRuleId::new("a"),
                ParsedRuleId::local("nested/path/rule"),
                ParsedRuleId {
                    source: "git@github.com:org/rules.git".into(),
                    path: "team/review".into(),
                    git_ref: "release-1.2".into(),
                    variables: vars(json!({"list": [1, "two"], "flag": false})),
                },
            ];
            for id in ids {
                let reparsed = ParsedRuleId::parse(&id.format()).expect("reparse");
                assert_eq!(reparsed, id);
                assert_eq!(reparsed.format(), id.format());
            }
        }
    }

    describe "paths" {
        it "replaces ref and bracket delimiters so built IDs round-trip" {
            let id = ParsedRuleId::new("a,b/c]d");
            assert_eq!(id.path, "a_b/c_d");
            assert_eq!(ParsedRuleId::parse(&id.format()).expect("reparse"), id);

            let local = ParsedRuleId::local("x,dev");
            assert_eq!(ParsedRuleId::parse(&local.format()).expect("reparse"), local);
        }

        it "drops dot segments from built IDs" {
            assert_eq!(ParsedRuleId::new("../../etc/./passwd").path, "etc/passwd");
            assert_eq!(ParsedRuleId::opaque("../outside").path, "outside");
        }

        it "rejects parent segments when parsing" {
            assert!(matches!(
                ParsedRuleId::parse("[contexture:../../x]"),
                Err(RuleIdError::ParentSegment(_))
            ));
            assert!(matches!(
                ParsedRuleId::parse("[contexture(local):a/ .. /b,main]"),
                Err(RuleIdError::ParentSegment(_))
            ));
            assert_eq!(ParsedRuleId::parse("[contexture:a/./b]").expect("parse").path, "a/b");
        }
    }

    describe "lenient parsing" {
        it "treats legacy strings as opaque local paths" {
            let id = ParsedRuleId::parse_lenient("old rule: v1");
            assert!(id.is_local());
            assert_eq!(id.path, "old_rule__v1");
        }

        it "matches rules regardless of ref and variables" {
            let a = ParsedRuleId::parse("[contexture:a/b,v1]").expect("parse");
            let b = ParsedRuleId::parse(r#"[contexture:a/b]{"x":1}"#).expect("parse");
            let c = ParsedRuleId::parse("[contexture(local):a/b]").expect("parse");
            assert!(a.same_rule(&b));
            assert!(!a.same_rule(&c));
        }

        it "recognises rule ID syntax" {
            assert!(is_rule_id("[contexture:a]"));
            assert!(!is_rule_id("a/b"));
        }
    }
}
