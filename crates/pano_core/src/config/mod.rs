//! Configuration management for pano-ingest.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Read-only loading for commands that must not touch the file
//! - Defaults for every field plus cross-field validation
//!
//! # Example
//!
//! ```no_run
//! use pano_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("settings.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Bucket: {}", config.settings().upload.bucket);
//!
//! config.settings_mut().upload.key_prefix = "trips/".to_string();
//! config.save().unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CatalogSettings, ConfigSection, DeviceSettings, LoggingSettings, PathSettings,
    PipelineSettings, Settings, StitchSettings, UploadSettings,
};
