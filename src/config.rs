//! Configuration system using TOML files (§6).
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-minder\config.toml
//! - macOS: ~/Library/Application Support/music-minder/config.toml
//! - Linux: ~/.config/music-minder/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; `save` is available for tooling that wants to persist a
//! generated config, but nothing in this crate mutates it at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory to scan for music.
    pub music_folder_path: PathBuf,

    /// Directory for cover-art and transcode caches.
    pub cache_path: PathBuf,

    /// Shared-secret bearer token the protocol adapters check; `None`
    /// means no authentication (local/dev use only).
    pub auth_token: Option<String>,

    /// Whether transcoded output is kept in `cache_path` across restarts.
    pub enable_transcoding_cache: bool,

    /// How often a background rescan is triggered, in hours.
    pub cache_refresh_interval_hours: u64,

    /// Whether ReplayGain should be computed for songs whose tags lack it.
    /// See SPEC_FULL.md §4.A Open Question: this crate does not implement
    /// gain analysis itself, so enabling this only marks songs for a future
    /// analyzer rather than computing a value during scan.
    pub compute_missing_replay_gain: bool,

    pub transcoding: TranscodingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            music_folder_path: PathBuf::new(),
            cache_path: default_cache_path(),
            auth_token: None,
            enable_transcoding_cache: true,
            cache_refresh_interval_hours: 12,
            compute_missing_replay_gain: false,
            transcoding: TranscodingConfig::default(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("music-minder")
}

/// Transcoding pipeline settings (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingConfig {
    /// Path to the `ffmpeg` binary, or a bare name to resolve via `PATH`.
    pub encoder_path: String,

    /// Maximum number of concurrent encoder child processes.
    pub max_concurrent_encoders: usize,

    /// Maximum number of concurrent ReplayGain analyses, should
    /// `compute_missing_replay_gain` be enabled by a future analyzer.
    pub max_concurrent_replay_gain_analyses: usize,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            encoder_path: "ffmpeg".to_string(),
            max_concurrent_encoders: 5,
            max_concurrent_replay_gain_analyses: 2,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-minder"))
}

/// Get the full path to the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
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

/// Save configuration to disk.
///
/// Creates the config directory if it doesn't exist. Writes atomically
/// (temp file + rename) so a crash mid-write never leaves a truncated
/// config on disk.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors.
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
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("music_folder_path"));
        assert!(toml.contains("[transcoding]"));
    }

    #[test]
    fn config_roundtrip() {
        let mut config = Config::default();
        config.music_folder_path = PathBuf::from("/music");
        config.auth_token = Some("secret".to_string());
        config.transcoding.max_concurrent_encoders = 4;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.music_folder_path, PathBuf::from("/music"));
        assert_eq!(parsed.auth_token, Some("secret".to_string()));
        assert_eq!(parsed.transcoding.max_concurrent_encoders, 4);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml = r#"
music_folder_path = "/srv/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.music_folder_path, PathBuf::from("/srv/music"));
        assert!(config.enable_transcoding_cache);
        assert_eq!(config.cache_refresh_interval_hours, 12);
        assert_eq!(config.transcoding.encoder_path, "ffmpeg");
    }
}
