use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{LogConfig, LogFormat, LogLevel};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// SQLite period log location
    pub database_path: PathBuf,

    /// User scope used when `--user` is not given
    pub default_user: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            database_path: AppConfig::config_dir().join("cyclecast.db"),
            default_user: "default_user".to_string(),
        }
    }
}

/// Keys accepted by [`AppConfig::get`] and [`AppConfig::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "settings.database_path",
    "settings.default_user",
    "logging.level",
    "logging.format",
    "logging.file_path",
    "logging.rotation",
    "logging.include_spans",
];

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Directory holding the config file and default database
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cyclecast")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Ignoring unreadable config {}: {:#}",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Read a setting by dotted key
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "settings.database_path" => self.settings.database_path.display().to_string(),
            "settings.default_user" => self.settings.default_user.clone(),
            "logging.level" => self.logging.level.to_filter(),
            "logging.format" => format!("{:?}", self.logging.format).to_lowercase(),
            "logging.file_path" => self
                .logging
                .file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "logging.rotation" => self.logging.rotation.to_string(),
            "logging.include_spans" => self.logging.include_spans.to_string(),
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        };
        Ok(value)
    }

    /// Update a setting by dotted key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "settings.database_path" => self.settings.database_path = PathBuf::from(value),
            "settings.default_user" => {
                if value.trim().is_empty() {
                    anyhow::bail!("default_user cannot be empty");
                }
                self.settings.default_user = value.trim().to_string();
            }
            "logging.level" => {
                self.logging.level = value.parse::<LogLevel>().map_err(anyhow::Error::msg)?
            }
            "logging.format" => {
                self.logging.format = value.parse::<LogFormat>().map_err(anyhow::Error::msg)?
            }
            "logging.file_path" => {
                self.logging.file_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "logging.rotation" => {
                self.logging.rotation = value
                    .parse()
                    .with_context(|| format!("Expected true/false, got '{}'", value))?
            }
            "logging.include_spans" => {
                self.logging.include_spans = value
                    .parse()
                    .with_context(|| format!("Expected true/false, got '{}'", value))?
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }

        self.metadata.updated_at = Utc::now();
        Ok(())
    }
}
