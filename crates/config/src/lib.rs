//! Configuration crate for the snapcam daemon
//!
//! Provides settings loading from TOML files with environment variable overrides.

pub mod config;

pub use config::{
    ArchiveConfig, CaptureConfig, Config, ConfigError, ServerConfig, StorageConfig,
};
