//! Configuration loading and types for voxrec
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/voxrec/config.toml)
//! 3. Environment variables (VOXREC_*)
//! 4. CLI arguments (highest priority)

use crate::audio::StreamConfig;
use crate::error::VoxrecError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Voxrec Configuration
#
# Location: ~/.config/voxrec/config.toml
# All settings can be overridden via CLI flags

[audio]
# Audio host: "default", or a cpal host name such as "alsa" or "jack"
host = "default"

# Sample rate in Hz. Devices must support it natively; there is no resampling.
sample_rate = 16000

# Channels to record: 1 (mono) or 2 (stereo)
channels = 1

# Frames per blocking read/write. Also the worst-case delay before a stop
# request takes effect (4096 frames at 16 kHz is 256 ms).
frames_per_buffer = 4096

# Device indexes (see `voxrec devices`). Omit to use the host default.
# input_device = 2
# output_device = 3

[recording]
# Where `voxrec record` writes when no path is given
output = "recording.wav"

# Play the recording back once it has been saved
play_after = false
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub recording: RecordingConfig,
}

/// Audio host and stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// cpal host name, or "default"
    pub host: String,

    pub sample_rate: u32,

    pub channels: u16,

    pub frames_per_buffer: u32,

    /// Input device index; host default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<usize>,

    /// Output device index; host default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            host: "default".to_string(),
            sample_rate: 16000,
            channels: 1,
            frames_per_buffer: 4096,
            input_device: None,
            output_device: None,
        }
    }
}

/// Recording output configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Default output file
    pub output: PathBuf,

    /// Play the recording back after saving
    pub play_after: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("recording.wav"),
            play_after: false,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxrec")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Capture stream configuration
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::capture(
            self.audio.sample_rate,
            self.audio.channels,
            self.audio.frames_per_buffer,
        )
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, VoxrecError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VoxrecError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| VoxrecError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Override config values from `VOXREC_*` variables, looked up through `lookup`
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), VoxrecError>
where
    F: Fn(&str) -> Option<String>,
{
    let device = |key: &str| -> Result<Option<usize>, VoxrecError> {
        lookup(key)
            .map(|value| {
                value.trim().parse().map_err(|_| {
                    VoxrecError::Config(format!(
                        "{} must be a device index, got '{}'",
                        key, value
                    ))
                })
            })
            .transpose()
    };

    if let Some(index) = device("VOXREC_INPUT_DEVICE")? {
        config.audio.input_device = Some(index);
    }
    if let Some(index) = device("VOXREC_OUTPUT_DEVICE")? {
        config.audio.output_device = Some(index);
    }
    if let Some(output) = lookup("VOXREC_OUTPUT") {
        config.recording.output = PathBuf::from(output);
    }
    if let Some(host) = lookup("VOXREC_HOST") {
        config.audio.host = host;
    }

    Ok(())
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), VoxrecError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| VoxrecError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| VoxrecError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| VoxrecError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}
