use crate::error::SpeechResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Starting values for a new speech request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Empty means the engine's own default language
    pub language: String,
    /// Voice name looked up in the engine's catalog
    pub voice: Option<String>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: String::new(),
            voice: None,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Engine
    pub engine: String,
    pub socket_path: Option<String>,
    pub client_name: String,
    pub connect_retries: usize,

    // Meta
    pub log_level: String,

    // Request
    pub defaults: RequestDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: "speechd".to_string(),
            socket_path: None,
            client_name: "utterance".to_string(),
            connect_retries: 3,
            log_level: "INFO".to_string(),
            defaults: RequestDefaults::default(),
        }
    }
}

impl Config {
    /// Load config from the user config dir, or use defaults
    pub fn load() -> SpeechResult<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from `path`
    ///
    /// A missing file yields defaults. A corrupt file is moved aside to
    /// `<name>.json.corrupt` and defaults are used.
    pub fn load_from(path: &Path) -> SpeechResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to the user config dir
    pub fn save(&self) -> SpeechResult<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> SpeechResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("utterance")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine, "speechd");
        assert_eq!(config.connect_retries, 3);
        assert!(config.socket_path.is_none());
        assert_eq!(config.defaults.rate, 1.0);
        assert!(config.defaults.voice.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{ "engine": "log", "defaults": { "rate": 2.5, "language": "de-DE" } }"#;
        let config: Config = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(config.engine, "log");
        assert_eq!(config.client_name, "utterance");
        assert_eq!(config.defaults.rate, 2.5);
        assert_eq!(config.defaults.pitch, 1.0);
        assert_eq!(config.defaults.language, "de-DE");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested/config.json");

        let mut config = Config::default();
        config.engine = "log".to_string();
        config.defaults.voice = Some("alba".to_string());
        config.save_to(&path).expect("Failed to save");

        let restored = Config::load_from(&path).expect("Failed to load");
        assert_eq!(restored, config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = Config::load_from(&dir.path().join("absent.json")).expect("Failed to load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid json").expect("Failed to write");

        let config = Config::load_from(&path).expect("Failed to load");
        assert_eq!(config, Config::default());
        assert!(!path.exists());
        assert!(dir.path().join("config.json.corrupt").exists());
    }
}
