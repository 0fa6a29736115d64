//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ATELIER_DB_PATH=/var/lib/atelier/atelier.db                        │
//! │     ATELIER_SKU_SEPARATOR=_                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/atelier/atelier.toml (Linux)                             │
//! │     ~/Library/Application Support/com.atelier.engine/atelier.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # atelier.toml
//! [database]
//! path = "atelier.db"
//! max_connections = 5
//!
//! [generation]
//! abbreviation_len = 3
//! separator = "-"
//!
//! [logging]
//! filter = "info,atelier=debug,sqlx=warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use atelier_core::{SkuFormat, DEFAULT_SKU_ABBREVIATION_LEN, DEFAULT_SKU_SEPARATOR};

use crate::pool::DbConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; relative paths resolve against the working directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "atelier", "engine")
        .map(|dirs| dirs.data_dir().join("atelier.db"))
        .unwrap_or_else(|| PathBuf::from("atelier.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Characters of each option display value in a generated SKU.
    #[serde(default = "default_abbreviation_len")]
    pub abbreviation_len: usize,

    /// Joins the SKU prefix and abbreviations.
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_abbreviation_len() -> usize {
    DEFAULT_SKU_ABBREVIATION_LEN
}

fn default_separator() -> String {
    DEFAULT_SKU_SEPARATOR.to_string()
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            abbreviation_len: default_abbreviation_len(),
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info,atelier=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads configuration: defaults, then file, then environment.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Like [`EngineConfig::load`], falling back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.generation.abbreviation_len == 0 {
            return Err(ConfigError::Invalid(
                "generation.abbreviation_len must be greater than 0".into(),
            ));
        }

        let separator_ok = self
            .generation
            .separator
            .chars()
            .all(|c| c == '-' || c == '_');
        if !separator_ok {
            return Err(ConfigError::Invalid(format!(
                "generation.separator must be '-', '_' or empty, got: '{}'",
                self.generation.separator
            )));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.filter) {
            return Err(ConfigError::Invalid(format!(
                "logging.filter is not a valid directive: {}",
                e
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ATELIER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("ATELIER_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring non-numeric ATELIER_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(len) = std::env::var("ATELIER_SKU_ABBREVIATION_LEN") {
            match len.parse::<usize>() {
                Ok(n) => self.generation.abbreviation_len = n,
                Err(_) => warn!(value = %len, "Ignoring non-numeric ATELIER_SKU_ABBREVIATION_LEN"),
            }
        }

        if let Ok(separator) = std::env::var("ATELIER_SKU_SEPARATOR") {
            self.generation.separator = separator;
        }

        if let Ok(filter) = std::env::var("ATELIER_LOG") {
            self.logging.filter = filter;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "atelier", "engine")
            .map(|dirs| dirs.config_dir().join("atelier.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// SKU format for the variant generator.
    pub fn sku_format(&self) -> SkuFormat {
        SkuFormat {
            separator: self.generation.separator.clone(),
            abbreviation_len: self.generation.abbreviation_len,
        }
    }

    /// Pool configuration for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=atelier=trace` - Show trace for atelier crates only
/// - Default: the configured `logging.filter`
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// =============================================================================
// Unit Tests
// =============================================================================
