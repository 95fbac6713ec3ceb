//! Lookup from format names to constructed [`Format`]s.

use std::collections::BTreeMap;

use super::{
    ClaudeStrategy, CursorStrategy, Format, FormatMetadata, FormatOptions, Strategy,
    WindsurfStrategy,
};
use crate::error::{FormatError, Result};
use crate::models::{FormatConfig, FormatType};

type Constructor = fn(&FormatOptions) -> Strategy;

/// Known formats and how to build their strategies.
#[derive(Clone)]
pub struct FormatRegistry {
    constructors: BTreeMap<FormatType, Constructor>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.available())
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Registry with the built-in formats.
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: BTreeMap::new(),
        };
        registry.register(FormatType::Claude, |_| Strategy::Claude(ClaudeStrategy::new()));
        registry.register(FormatType::Cursor, |_| Strategy::Cursor(CursorStrategy::new()));
        registry.register(FormatType::Windsurf, |options| {
            Strategy::Windsurf(WindsurfStrategy::new(
                options.mode.unwrap_or_default(),
                options.user_rules,
            ))
        });
        registry
    }

    pub fn register(&mut self, format_type: FormatType, constructor: Constructor) {
        self.constructors.insert(format_type, constructor);
    }

    /// Registered format types, in stable order.
    pub fn available(&self) -> Vec<FormatType> {
        self.constructors.keys().copied().collect()
    }

    /// Metadata for every registered format with default options.
    pub fn describe(&self) -> Vec<FormatMetadata> {
        self.constructors
            .values()
            .map(|constructor| constructor(&FormatOptions::default()).as_strategy().metadata())
            .collect()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        FormatType::from_str(name).is_some_and(|t| self.constructors.contains_key(&t))
    }

    /// Build a format by name (case-insensitive).
    pub fn create(&self, name: &str, options: &FormatOptions) -> Result<Format> {
        let format_type =
            FormatType::from_str(name).ok_or_else(|| FormatError::UnknownFormat(name.to_string()))?;
        self.create_type(format_type, options)
    }

    pub fn create_type(&self, format_type: FormatType, options: &FormatOptions) -> Result<Format> {
        let constructor = self
            .constructors
            .get(&format_type)
            .ok_or_else(|| FormatError::UnknownFormat(format_type.to_string()))?;
        Ok(Format::new(constructor(options), options))
    }

    pub fn create_from_config(&self, config: &FormatConfig) -> Result<Format> {
        self.create_type(config.format_type, &FormatOptions::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputMode;

    #[test]
    fn test_available_formats() {
        let registry = FormatRegistry::new();
        assert_eq!(
            registry.available(),
            vec![FormatType::Claude, FormatType::Cursor, FormatType::Windsurf]
        );
        assert!(registry.is_supported("Cursor"));
        assert!(!registry.is_supported("vscode"));
    }

    #[test]
    fn test_create_unknown_format() {
        let err = FormatRegistry::new()
            .create("vscode", &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, FormatError::UnknownFormat(name) if name == "vscode"));
    }

    #[test]
    fn test_windsurf_mode_from_options() {
        let registry = FormatRegistry::new();
        let single = FormatOptions {
            mode: Some(OutputMode::Single),
            ..Default::default()
        };
        assert!(registry.create("windsurf", &single).unwrap().is_single_file());
        assert!(!registry
            .create("windsurf", &FormatOptions::default())
            .unwrap()
            .is_single_file());

        let user = FormatOptions {
            mode: Some(OutputMode::Multi),
            user_rules: true,
            ..Default::default()
        };
        assert!(registry.create("windsurf", &user).unwrap().is_single_file());
    }
}
