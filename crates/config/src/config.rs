//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Storage layout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Root directory holding one image folder per source
    #[serde(default = "default_image_root")]
    pub image_root: PathBuf,
    /// Directory for temporary archive files
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Durable source-configuration state file
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Minimum free bytes required before a capture is admitted
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

fn default_image_root() -> PathBuf {
    PathBuf::from("images")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/snapcam")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_min_free_bytes() -> u64 {
    // 2 GiB
    2 * 1024 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_root: default_image_root(),
            temp_dir: default_temp_dir(),
            state_file: default_state_file(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

/// Archive lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Minutes a created archive is kept before its deletion job fires
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u64,
}

fn default_expiry_minutes() -> u64 {
    30
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_expiry_minutes(),
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Listen address for the collaborator-facing HTTP API
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Capture worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Maximum concurrently running job actions (0 = auto-derive from CPU count)
    #[serde(default)]
    pub max_concurrent_jobs: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SNAPCAM_IMAGE_ROOT -> storage.image_root
    /// - SNAPCAM_TEMP_DIR -> storage.temp_dir
    /// - SNAPCAM_STATE_FILE -> storage.state_file
    /// - SNAPCAM_MIN_FREE_BYTES -> storage.min_free_bytes
    /// - SNAPCAM_ARCHIVE_EXPIRY_MINUTES -> archive.expiry_minutes
    /// - SNAPCAM_LISTEN_ADDR -> server.listen_addr
    /// - SNAPCAM_MAX_CONCURRENT_JOBS -> capture.max_concurrent_jobs
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SNAPCAM_IMAGE_ROOT") {
            self.storage.image_root = PathBuf::from(val);
        }

        if let Ok(val) = env::var("SNAPCAM_TEMP_DIR") {
            self.storage.temp_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("SNAPCAM_STATE_FILE") {
            self.storage.state_file = PathBuf::from(val);
        }

        if let Ok(val) = env::var("SNAPCAM_MIN_FREE_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.storage.min_free_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("SNAPCAM_ARCHIVE_EXPIRY_MINUTES") {
            if let Ok(minutes) = val.parse::<u64>() {
                self.archive.expiry_minutes = minutes;
            }
        }

        if let Ok(val) = env::var("SNAPCAM_LISTEN_ADDR") {
            self.server.listen_addr = val;
        }

        if let Ok(val) = env::var("SNAPCAM_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<usize>() {
                self.capture.max_concurrent_jobs = jobs;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
