//! Pipeline configuration.
//!
//! Defaults can be overridden from a JSON file with camelCase keys:
//!
//! ```text
//! { "delimiter": ",", "ageThreshold": 30, "requireActive": false }
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Recognized pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    /// Field delimiter for delimited input and output.
    pub delimiter: char,
    /// Inclusive upper bound on `age` for the default filter.
    pub age_threshold: i64,
    /// Whether the default filter requires `isActive == true`.
    pub require_active: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            age_threshold: 20,
            require_active: true,
        }
    }
}

impl PipelineConfig {
    /// Load a config file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter_byte().map(|_| ())
    }

    /// The delimiter as the single byte the decoder expects.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        match self.delimiter {
            '"' | '\n' | '\r' => Err(ConfigError::Delimiter(self.delimiter)),
            c if c.is_ascii() => Ok(c as u8),
            c => Err(ConfigError::Delimiter(c)),
        }
    }
}
