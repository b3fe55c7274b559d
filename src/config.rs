use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime settings for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between two scheduled frames, in milliseconds.
    pub frame_interval: u64,
    /// Where the scene document lives, if it is read from disk.
    pub scene_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_interval: 16,
            scene_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = EngineConfig::from_toml_str("scene_path = \"scenes/main.json\"").unwrap();
        assert_eq!(config.frame_interval, 16);
        assert_eq!(config.scene_path, Some(PathBuf::from("scenes/main.json")));
    }

    #[test]
    fn frame_interval_is_milliseconds() {
        let config = EngineConfig::from_toml_str("frame_interval = 33").unwrap();
        assert_eq!(config.frame_interval(), Duration::from_millis(33));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("frame_interval = "),
            Err(ConfigError::Toml(_))
        ));
    }
}
