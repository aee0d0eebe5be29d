//! Studio Configuration
//!
//! One optional JSON file; every field has a default, so an empty object or
//! a missing file both yield a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GenerationConfig;
use crate::history::DEFAULT_CAPACITY;
use crate::optimizer::OptimizerConfig;
use crate::templates::FallbackImage;
use crate::validation::UploadConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioConfig {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub placeholder: FallbackImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

fn default_capacity() -> usize { DEFAULT_CAPACITY }
fn default_history_path() -> PathBuf { PathBuf::from("decode_history_v3.json") }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            path: default_history_path(),
        }
    }
}

impl StudioConfig {
    /// Defaults when the file does not exist; an unreadable or invalid file is an error
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(StudioConfig::from_json("{}").unwrap(), StudioConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = StudioConfig::from_json(
            r#"{"optimizer": {"byteBudget": 1024}, "history": {"capacity": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.optimizer.byte_budget, 1024);
        assert_eq!(config.optimizer.max_width, 1600);
        assert_eq!(config.history.capacity, 5);
        assert_eq!(config.history.path, PathBuf::from("decode_history_v3.json"));
        assert_eq!(config.placeholder.host, "placehold.co");
    }

    #[test]
    fn test_missing_file_defaults_and_bad_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert_eq!(StudioConfig::load(&missing).unwrap(), StudioConfig::default());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(StudioConfig::load(&bad), Err(ConfigError::Parse(_))));
    }
}
