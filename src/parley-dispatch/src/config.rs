//! Dispatch configuration.

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How command name segments are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameComparer {
    /// Segments must match exactly.
    CaseSensitive,
    /// Segments match ignoring case.
    #[default]
    CaseInsensitive,
}

impl NameComparer {
    /// Normalize a segment into the form used as a trie edge key.
    pub fn normalize<'a>(&self, segment: &'a str) -> Cow<'a, str> {
        match self {
            NameComparer::CaseSensitive => Cow::Borrowed(segment),
            NameComparer::CaseInsensitive => {
                if segment.chars().any(char::is_uppercase) {
                    Cow::Owned(segment.to_lowercase())
                } else {
                    Cow::Borrowed(segment)
                }
            }
        }
    }
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Character separating arguments.
    pub separator: char,

    /// Characters that open a quoted span.
    pub start_quotes: Vec<char>,

    /// Characters that close a quoted span. Any of them closes any start quote.
    pub end_quotes: Vec<char>,

    /// Whether a backslash before a quote character disables it.
    pub allow_escaping: bool,

    /// How name segments are compared.
    pub name_comparer: NameComparer,

    /// Priority subtracted per transposition from swapped-argument variants.
    pub swap_priority_penalty: i32,

    /// Whether tokens beyond the last parameter are silently dropped.
    pub ignore_extra_arguments: bool,

    /// Whether a failed dispatch reports commands under the deepest matched path.
    pub suggest_partial_paths: bool,

    /// Upper bound on reported suggestions.
    pub max_suggestions: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            separator: ' ',
            start_quotes: vec!['"', '\u{201C}', '\u{00AB}'],
            end_quotes: vec!['"', '\u{201D}', '\u{00BB}'],
            allow_escaping: true,
            name_comparer: NameComparer::default(),
            swap_priority_penalty: 1,
            ignore_extra_arguments: false,
            suggest_partial_paths: true,
            max_suggestions: 10,
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a TOML file.
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_quotes.is_empty() || self.end_quotes.is_empty() {
            return Err(ConfigError::Invalid(
                "start_quotes and end_quotes must not be empty".to_string(),
            ));
        }
        if self.is_quote(self.separator) {
            return Err(ConfigError::Invalid(format!(
                "separator {:?} is also a quote character",
                self.separator
            )));
        }
        if self.allow_escaping && (self.separator == '\\' || self.is_quote('\\')) {
            return Err(ConfigError::Invalid(
                "backslash cannot be a separator or quote while escaping is enabled".to_string(),
            ));
        }
        if self.swap_priority_penalty < 0 {
            return Err(ConfigError::Invalid(
                "swap_priority_penalty must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn is_quote(&self, c: char) -> bool {
        self.start_quotes.contains(&c) || self.end_quotes.contains(&c)
    }
}
