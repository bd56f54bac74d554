use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::import::DuplicatePolicy;
use crate::logging::LogConfig;
use crate::stats::DEFAULT_MOVING_AVERAGE_PERIOD;
use crate::validation::ValidationConfig;

/// Everything read from `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub metadata: ConfigMetadata,

    /// Where the measurements live
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Thresholds for the advisory checks run before saving
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Defaults for the stats, trend and show commands
    #[serde(default)]
    pub display: DisplaySettings,

    /// Data import preferences
    #[serde(default)]
    pub import: ImportSettings,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Bookkeeping written alongside the settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Crate version that wrote the file
    pub version: String,

    pub created_at: DateTime<Utc>,

    /// Bumped by every save
    pub updated_at: DateTime<Utc>,
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path
    pub path: PathBuf,
}

/// Display defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Number of most recent records summarized by `stats`
    pub stats_window: usize,

    /// Period of the moving average shown by `trend`
    pub moving_average_period: usize,

    /// Calendar days shown by `show` and `trend` when no flag is given
    /// (`None` shows the full history)
    pub default_period_days: Option<u32>,

    /// Days looked back to find the starting weight for goal progress
    pub goal_period_days: u32,
}

/// Defaults for `weightrs import`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// What to do with rows whose date is already stored
    pub duplicate_policy: DuplicatePolicy,

    /// Show a progress bar while importing
    pub show_progress: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            metadata: ConfigMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: now,
                updated_at: now,
            },
            database: DatabaseSettings::default(),
            validation: ValidationConfig::default(),
            display: DisplaySettings::default(),
            import: ImportSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("weightrs")
                .join("data.db"),
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            stats_window: 30,
            moving_average_period: DEFAULT_MOVING_AVERAGE_PERIOD,
            default_period_days: Some(30),
            goal_period_days: 30,
        }
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Skip,
            show_progress: true,
        }
    }
}

impl AppConfig {
    /// Read and parse a TOML config file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Write the config as TOML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// `<config dir>/weightrs/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("weightrs")
            .join("config.toml")
    }

    /// Load configuration from `path`, falling back to defaults if it is
    /// missing or unreadable
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Using default configuration");
                Self::default()
            }
        }
    }
}
