//! Store sizing and lock naming
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```
//! use graphsync::config::GraphConfig;
//!
//! let config = GraphConfig::from_json_str(r#"{ "nodes": { "max_modified": 8 } }"#).unwrap();
//! assert_eq!(config.nodes.block_size, 1024);
//! assert_eq!(config.nodes.max_modified, 8);
//! assert_eq!(config.edges.max_modified, 32);
//! ```

use serde::Deserialize;
use std::path::Path;

/// Slots per dirty-tracking block
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Modified slots in one block at which the whole block is sent instead
pub const DEFAULT_MAX_MODIFIED: usize = 32;

/// Offsets inside a block are stored as `u16`
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::GraphError {
    fn from(e: ConfigError) -> Self {
        crate::GraphError::Other(e.to_string())
    }
}

/// Sizing of one record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Slots per block (**B**)
    pub block_size: usize,
    /// Threshold (**M**) at which a dirty block is flushed as one range
    pub max_modified: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_modified: DEFAULT_MAX_MODIFIED,
        }
    }
}

impl StoreConfig {
    /// Check the invariants the store relies on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `block_size` is zero or larger
    /// than [`MAX_BLOCK_SIZE`], or `max_modified` is not in `1..=block_size`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "block_size must be in 1..={MAX_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        if self.max_modified == 0 || self.max_modified > self.block_size {
            return Err(ConfigError::Invalid(format!(
                "max_modified must be in 1..={}, got {}",
                self.block_size, self.max_modified
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    pub nodes: StoreConfig,
    pub edges: StoreConfig,
    /// Resource name reported in `Busy` errors
    pub lock_name: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            nodes: StoreConfig::default(),
            edges: StoreConfig::default(),
            lock_name: "State".to_string(),
        }
    }
}

impl GraphConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// # Errors
    ///
    /// Returns the first store configuration error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.nodes.validate()?;
        self.edges.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::from_json_str("{}").unwrap();
        assert_eq!(config, GraphConfig::default());
        assert_eq!(config.lock_name, "State");
    }

    #[test]
    fn test_rejects_oversized_block() {
        let err = GraphConfig::from_json_str(r#"{ "edges": { "block_size": 70000 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_rejects_threshold_above_block() {
        let config = StoreConfig {
            block_size: 16,
            max_modified: 17,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_field() {
        let err = GraphConfig::from_json_str(r#"{ "nodez": {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)), "{err}");
    }
}
