//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\soundshelf\config.toml
//! - macOS: ~/Library/Application Support/soundshelf/config.toml
//! - Linux: ~/.config/soundshelf/config.toml
//!
//! The config file is human-readable and editable. Every section is
//! optional; missing keys fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hosted backend the catalog is read from
    pub backend: BackendConfig,

    /// Public object storage for audio files
    pub storage: StorageConfig,

    /// Playback behaviour
    pub playback: PlaybackConfig,

    /// Toast notifications
    pub notifications: NotificationConfig,
}

/// Hosted backend (PostgREST-style API)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: Option<String>,

    /// Anonymous (public) API key
    pub anon_key: Option<String>,
}

/// Object storage settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL relative audio paths are joined onto.
    /// Unset = references are used as-is.
    pub base_url: Option<String>,
}

/// Audio playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between selecting a track and starting it (0 = start as soon as ready)
    pub settle_delay_ms: u64,

    /// Initial volume level (0.0 - 1.0)
    pub volume: f32,

    /// Position update interval
    pub tick_ms: u64,

    /// Selected output device name (empty = system default)
    pub output_device: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            volume: 1.0,
            tick_ms: 250,
            output_device: String::new(),
        }
    }
}

impl PlaybackConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    /// The configured output device, if one is set.
    pub fn output_device(&self) -> Option<&str> {
        Some(self.output_device.trim()).filter(|d| !d.is_empty())
    }
}

/// Toast notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// How long a toast stays visible
    pub toast_duration_secs: u64,

    /// Maximum toasts shown at once
    pub max_visible: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            toast_duration_secs: 4,
            max_visible: 5,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("soundshelf"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to a specific file.
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

/// Save configuration without blocking the async runtime
pub async fn save_async(config: Config) -> Result<PathBuf, ConfigError> {
    tokio::task::spawn_blocking(move || save(&config))
        .await
        .map_err(|e| ConfigError::TaskJoin(e.to_string()))?
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[backend]"));
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[playback]"));
        assert!(toml.contains("[notifications]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.backend.url = Some("https://xyz.example.co".to_string());
        config.storage.base_url = Some("https://xyz.example.co/storage/v1/object/public/audio".into());
        config.playback.settle_delay_ms = 0;
        config.playback.volume = 0.75;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Config with only some fields
        let toml = r#"
[playback]
volume = 0.5
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Specified field is set
        assert_eq!(config.playback.volume, 0.5);

        // Other fields use defaults
        assert_eq!(config.playback.settle_delay_ms, 100);
        assert_eq!(config.playback.tick(), Duration::from_millis(250));
        assert!(config.backend.url.is_none());
        assert_eq!(config.notifications.max_visible, 5);
    }

    #[test]
    fn test_output_device_blank_means_default() {
        let mut playback = PlaybackConfig::default();
        assert_eq!(playback.output_device(), None);
        playback.output_device = " Speakers ".to_string();
        assert_eq!(playback.output_device(), Some("Speakers"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.notifications.toast_duration_secs = 9;
        save_to(&config, &path).unwrap();

        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(load_from(&path), config);
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        assert_eq!(load_from(&path), Config::default());
        assert_eq!(load_from(&dir.path().join("missing.toml")), Config::default());
    }
}
