//! Binding configuration.
//!
//! [`BindingConfig`] names the three root types the binding uses inside the
//! replicated document and declares which fields are rich text. It can be
//! built in code or deserialized from JSON; missing keys take their defaults.
//!
//! ```
//! use recordsync::BindingConfig;
//!
//! let config = BindingConfig::from_json(r#"{"rich_text_fields": ["text"]}"#).unwrap();
//! assert_eq!(config.records_root, "records");
//! assert!(config.field_policy().is_rich_text("text"));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::FieldPolicy;

/// Errors raised while loading or validating a [`BindingConfig`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Root name for {role} must not be empty")]
    EmptyRootName { role: &'static str },

    #[error("Root name '{name}' is used for more than one structure")]
    DuplicateRootName { name: String },
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Root array holding one map per record.
    pub records_root: String,
    /// Root array holding the title of each record, index-aligned with `records_root`.
    pub titles_root: String,
    /// Root array of deleted titles.
    pub tombstones_root: String,
    /// Fields always stored as collaborative text.
    pub rich_text_fields: Vec<String>,
    /// Fields whose name starts with this prefix are stored as collaborative text.
    pub rich_text_prefix: Option<String>,
    /// Presence field carrying the local cursor.
    pub cursor_field: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            records_root: "records".to_string(),
            titles_root: "titles".to_string(),
            tombstones_root: "tombstones".to_string(),
            rich_text_fields: Vec::new(),
            rich_text_prefix: None,
            cursor_field: "cursor".to_string(),
        }
    }
}

impl BindingConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn with_rich_text_fields(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.rich_text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rich_text_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rich_text_prefix = Some(prefix.into());
        self
    }

    /// Check that the three root names are non-empty and distinct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let roots = [
            ("records", &self.records_root),
            ("titles", &self.titles_root),
            ("tombstones", &self.tombstones_root),
        ];
        for (role, name) in roots {
            if name.is_empty() {
                return Err(ConfigError::EmptyRootName { role });
            }
        }
        for (i, (_, name)) in roots.iter().enumerate() {
            if roots[i + 1..].iter().any(|(_, other)| other == name) {
                return Err(ConfigError::DuplicateRootName {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The rich-text field policy described by this config.
    pub fn field_policy(&self) -> FieldPolicy {
        let policy = FieldPolicy::new(self.rich_text_fields.iter().cloned());
        match &self.rich_text_prefix {
            Some(prefix) => policy.with_prefix(prefix.clone()),
            None => policy,
        }
    }
}
