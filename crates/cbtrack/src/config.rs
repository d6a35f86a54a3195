//! Configuration management for cbtrack.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "cbtrack";

/// Default roster file name.
const ROSTER_FILE_NAME: &str = "validation.json";

/// Default device status file name.
const STATUS_FILE_NAME: &str = "status.json";

/// Default batch queue file name.
const BATCH_FILE_NAME: &str = "batch.json";

/// Default sheet credentials file name.
const CREDENTIALS_FILE_NAME: &str = "api_key.json";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CBTRACK_`)
/// 2. TOML config file at `~/.config/cbtrack/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data file configuration.
    pub data: DataConfig,
    /// Scanner configuration.
    pub scanner: ScannerConfig,
    /// Device inventory configuration.
    pub inventory: InventoryConfig,
    /// Remote sheet configuration.
    pub sheet: SheetConfig,
    /// Batch flush configuration.
    pub flush: FlushConfig,
}

/// Local data file configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding roster, status, and batch files.
    /// Defaults to `~/.local/share/cbtrack`
    pub data_dir: Option<PathBuf>,
    /// Path to the roster (validation) file.
    /// Defaults to `<data_dir>/validation.json`
    pub roster_path: Option<PathBuf>,
    /// Path to the device status file.
    /// Defaults to `<data_dir>/status.json`
    pub status_path: Option<PathBuf>,
    /// Path to the batch queue file.
    /// Defaults to `<data_dir>/batch.json`
    pub batch_path: Option<PathBuf>,
}

/// Scanner-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// The scan source to use. Currently only `stdin` (keyboard-wedge
    /// scanners presenting as keyboards).
    pub source: String,
    /// Minimum gap between two reads of the same payload in milliseconds.
    /// Repeated reads inside the gap are dropped as scanner bounce.
    pub min_scan_gap_ms: u64,
}

/// Device inventory configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Regex that device ids must match. Rows pulled from the remote
    /// store that do not match are dropped during refresh.
    pub device_pattern: String,
}

/// Remote sheet configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Base URL of the sheet bridge endpoint. Empty disables remote
    /// operations (entries stay queued locally).
    pub endpoint: String,
    /// Spreadsheet document name.
    pub spreadsheet: String,
    /// Worksheet (tab) name, typically the room identifier.
    pub worksheet: String,
    /// Path to the credentials file holding the bearer token.
    /// Defaults to `<data_dir>/api_key.json`
    pub credentials_path: Option<PathBuf>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Interval between remote status refreshes in seconds.
    /// Set to 0 to disable refreshing.
    pub refresh_interval_secs: u64,
}

/// Batch flush configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Interval between periodic flushes in seconds.
    pub interval_secs: u64,
    /// Queue size that triggers an immediate flush.
    pub max_batch: usize,
    /// Cooldown window after a remote rate limit in seconds.
    pub cooldown_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            source: "stdin".to_string(),
            min_scan_gap_ms: 1_500,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            // Matches ids like "SF16-3" or "CALC-12"
            device_pattern: r"^[A-Za-z]+[0-9]*-[0-9]+$".to_string(),
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            spreadsheet: "Chromebook Tracker".to_string(),
            worksheet: "SF16".to_string(),
            credentials_path: None,
            timeout_secs: 30,
            refresh_interval_secs: 300,
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_batch: 10,
            cooldown_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `CBTRACK_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("CBTRACK_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.source != "stdin" {
            return Err(Error::ConfigValidation {
                message: format!("unknown scan source: {}", self.scanner.source),
            });
        }

        if self.flush.interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "flush interval_secs must be greater than 0".to_string(),
            });
        }

        if self.flush.max_batch == 0 {
            return Err(Error::ConfigValidation {
                message: "flush max_batch must be greater than 0".to_string(),
            });
        }

        if self.flush.cooldown_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "flush cooldown_secs must be greater than 0".to_string(),
            });
        }

        if regex::Regex::new(&self.inventory.device_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid device pattern: {}",
                    self.inventory.device_pattern
                ),
            });
        }

        if !self.sheet.endpoint.is_empty()
            && reqwest::Url::parse(&self.sheet.endpoint).is_err()
        {
            return Err(Error::ConfigValidation {
                message: format!("invalid sheet endpoint: {}", self.sheet.endpoint),
            });
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the roster path, resolving defaults if not set.
    #[must_use]
    pub fn roster_path(&self) -> PathBuf {
        self.data
            .roster_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(ROSTER_FILE_NAME))
    }

    /// Get the device status path, resolving defaults if not set.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.data
            .status_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(STATUS_FILE_NAME))
    }

    /// Get the batch queue path, resolving defaults if not set.
    #[must_use]
    pub fn batch_path(&self) -> PathBuf {
        self.data
            .batch_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(BATCH_FILE_NAME))
    }

    /// Get the crash log directory.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Get the credentials path, resolving defaults if not set.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.sheet
            .credentials_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(CREDENTIALS_FILE_NAME))
    }

    /// Get the minimum scan gap as a Duration.
    #[must_use]
    pub fn min_scan_gap(&self) -> Duration {
        Duration::from_millis(self.scanner.min_scan_gap_ms)
    }

    /// Get the flush interval as a Duration.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush.interval_secs)
    }

    /// Get the rate-limit cooldown as a Duration.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.flush.cooldown_secs)
    }

    /// Get the remote refresh interval as a Duration.
    ///
    /// Returns `None` when refreshing is disabled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        if self.sheet.refresh_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sheet.refresh_interval_secs))
        }
    }

    /// Get the sheet request timeout as a Duration.
    #[must_use]
    pub fn sheet_timeout(&self) -> Duration {
        Duration::from_secs(self.sheet.timeout_secs)
    }
}
