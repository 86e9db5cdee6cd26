//! Configuration loading and root folder resolution
//!
//! Settings come from an optional TOML file. Missing or unreadable files are
//! never fatal: the loader logs a warning and falls back to compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FDW_ROOT_FOLDER";

/// Environment variable pointing at an explicit TOML config file
pub const CONFIG_PATH_ENV: &str = "FDW_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "warehouse.db";

/// Contents of `fdw.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the warehouse database
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Fact loader tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Records per chunk (bounds memory in flight)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Attempts per sink write before the run is failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Overall deadline for one file load; unset means no deadline
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_bind_address() -> String {
    "127.0.0.1:5740".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.loader.chunk_size == 0 {
            return Err(Error::Config("loader.chunk_size must be at least 1".to_string()));
        }
        if self.loader.max_attempts == 0 {
            return Err(Error::Config("loader.max_attempts must be at least 1".to_string()));
        }
        if self.loader.initial_backoff_ms > self.loader.max_backoff_ms {
            return Err(Error::Config(format!(
                "loader.initial_backoff_ms ({}) exceeds loader.max_backoff_ms ({})",
                self.loader.initial_backoff_ms, self.loader.max_backoff_ms
            )));
        }
        Ok(())
    }
}

/// Load configuration, degrading to defaults when no file is available.
///
/// Lookup order: explicit path, `FDW_CONFIG`, then the platform config dir
/// (`<config_dir>/fdw/fdw.toml`). An explicit path that fails to parse is an
/// error; a missing one is only a warning.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .or_else(default_config_path);

    let Some(path) = candidate else {
        warn!("No configuration directory available, using defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write configuration back to disk (used to seed a config file)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    // Write to a sibling temp file first so readers never see a partial file
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fdw").join("fdw.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `FDW_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("fdw"))
        .unwrap_or_else(|| PathBuf::from("./fdw_data"))
}

/// Warehouse database path under a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}
