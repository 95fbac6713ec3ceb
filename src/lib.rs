//! Generate AI assistant rule files from templated rules.
//!
//! A rule is a small Markdown template with metadata, identified by a
//! bracketed ID such as `[contexture:languages/go/testing]`. Rules are
//! rendered through a two-stage template pipeline and written in the layout
//! each tool expects (Claude, Cursor, Windsurf). Installed rules are
//! recovered by reading the generated files back.

pub mod config;
pub mod error;
pub mod formats;
pub mod loader;
pub mod models;
pub mod rule_id;
pub mod template;
