//! Domain models for Contexture.
//!
//! # Core Concepts
//!
//! - [`Rule`]: A templated document plus metadata, handed in by the resolver.
//! - [`ProcessedRule`]: A rule with its effective template variables, built per transform.
//! - [`TransformedRule`]: A rule rendered for one format.
//! - [`InstalledRule`]: A rule reconstructed by reading generated files back.
//!   There is no index; the files on disk are the only record.
//! - [`FormatConfig`]: Where and how one format writes its output.
//! - [`ValidationResult`]: Errors and warnings returned as data.

mod format;
mod rule;
mod transformed;
mod validation;

pub use format::*;
pub use rule::*;
pub use transformed::*;
pub use validation::*;
