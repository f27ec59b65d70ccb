//! Search configuration.

use crate::units::UnitRegistry;
use std::env;
use std::sync::Arc;

/// Immutable configuration shared by the parser and compiler.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// Units understood in quantity literals
    pub units: Arc<UnitRegistry>,
    /// Whether the non-advanced full-text search respects case
    pub fulltext_case_sensitive: bool,
}

impl SearchConfig {
    /// Create a configuration with the default unit registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to set full-text case sensitivity.
    pub fn with_fulltext_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.fulltext_case_sensitive = case_sensitive;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let fulltext_case_sensitive = match env::var("SAMPLEDB_SEARCH_FULLTEXT_CASE_SENSITIVE") {
            Ok(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                name: "SAMPLEDB_SEARCH_FULLTEXT_CASE_SENSITIVE",
                value,
            })?,
            Err(_) => false,
        };

        Ok(Self {
            units: Arc::new(UnitRegistry::new()),
            fulltext_case_sensitive,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid boolean value for {name}: {value}")]
    InvalidBool { name: &'static str, value: String },
}
