//! Configuration management for the trainer
//!
//! Settings are stored as JSON in `~/.hebrew-trainer/config.json` with a
//! schema version so older files can be migrated forward. Every section
//! falls back to defaults for missing fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recognition::RecognitionSettings;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Errors raised while loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Run options
    pub training: TrainingConfig,
    /// Recogniser settings
    pub recognition: RecognitionConfig,
    /// Delays between stage and session transitions
    pub timing: TimingConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            training: TrainingConfig::default(),
            recognition: RecognitionConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Training run options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Skip the English translation stage
    pub hebrew_only_mode: bool,
    /// JSON word list to use instead of the built-in list
    pub word_list_path: Option<PathBuf>,
}

/// Recogniser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Language tag used during the Hebrew stage
    pub hebrew_language: String,
    /// Language tag used during the translation stage
    pub english_language: String,
    /// Keep the stream open across pauses
    pub continuous: bool,
    /// Deliver partial hypotheses before they are final
    pub interim_results: bool,
    /// Alternatives requested per segment
    pub max_alternatives: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            hebrew_language: "he-IL".to_string(),
            english_language: "en-US".to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

impl RecognitionConfig {
    /// Recogniser settings for the given language
    pub fn settings_for(&self, language: &str) -> RecognitionSettings {
        RecognitionSettings {
            continuous: self.continuous,
            interim_results: self.interim_results,
            max_alternatives: self.max_alternatives,
            language: language.to_string(),
        }
    }
}

/// Delays, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait before a deferred session start, letting a prior stop settle
    pub start_delay_ms: u64,
    /// Wait before restarting a stream that ended on its own
    pub restart_delay_ms: u64,
    /// Wait before restarting after a recoverable stream error
    pub error_restart_delay_ms: u64,
    /// Wait after entering a stage before listening
    pub stage_settle_delay_ms: u64,
    /// Wait after an accepted match before moving on
    pub feedback_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 100,
            restart_delay_ms: 150,
            error_restart_delay_ms: 1000,
            stage_settle_delay_ms: 150,
            feedback_delay_ms: 100,
        }
    }
}

impl TimingConfig {
    /// Smallest delay allowed before a restart
    pub const MIN_RETRY_DELAY_MS: u64 = 10;

    /// Raise restart delays below [`Self::MIN_RETRY_DELAY_MS`] to the floor
    pub fn with_retry_floor(self) -> Self {
        let floored = Self {
            restart_delay_ms: self.restart_delay_ms.max(Self::MIN_RETRY_DELAY_MS),
            error_restart_delay_ms: self.error_restart_delay_ms.max(Self::MIN_RETRY_DELAY_MS),
            ..self
        };
        if floored != self {
            tracing::warn!(
                "Restart delays below {}ms are not allowed, using {}ms/{}ms",
                Self::MIN_RETRY_DELAY_MS,
                floored.restart_delay_ms,
                floored.error_restart_delay_ms
            );
        }
        floored
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Also append to `~/.hebrew-trainer/logs/hebrew-trainer.log`
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: true,
        }
    }
}

/// Get the path to the data directory (~/.hebrew-trainer)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".hebrew-trainer")
}

/// Get the path to the config file (~/.hebrew-trainer/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from disk
///
/// A missing file yields defaults. Older schema versions are migrated and
/// written back.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;

    if migrated.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            migrated.version
        );
        save_config(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to disk as pretty JSON
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }
    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }
    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: files written before timings were configurable
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}
