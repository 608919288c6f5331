//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Read-only loading with defaults for commands that must not write
//! - Unknown or missing sections are detected on load and the file is rewritten
//! - Cross-field validation before settings are handed to the pipeline

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::DocumentMut;

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the ingest configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Platform config location, e.g. `~/.config/pano-ingest/settings.toml`.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "pano-ingest")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
            .unwrap_or_else(|| PathBuf::from("pano-ingest.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Changes are only in memory until `save()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the manager and return the loaded settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist or fails validation.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file if present, else use defaults. Never writes.
    ///
    /// Unknown sections are reported but the file is left as it is.
    pub fn load_or_default(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            tracing::debug!(
                "No config at {}, using defaults",
                self.config_path.display()
            );
            self.settings = Settings::default();
            return Ok(());
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (settings, _) = self.parse_and_check_sections(&content)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// Files with unknown or missing sections are rewritten in canonical form.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, needs_rewrite) = self.parse_and_check_sections(&content)?;
            settings.validate().map_err(ConfigError::Invalid)?;
            self.settings = settings;

            if needs_rewrite {
                tracing::info!(
                    "Rewriting {} with canonical sections",
                    self.config_path.display()
                );
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("Created default config at {}", self.config_path.display());
        }
        Ok(())
    }

    /// Create the output and logs folders (and staging when enabled).
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        let mut dirs = vec![paths.output_folder(), paths.logs_folder()];
        if self.settings.device.copy_to_staging {
            dirs.push(paths.staging_dir());
        }

        for dir in dirs {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn parse_and_check_sections(&self, content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;
        let settings: Settings = toml::from_str(content)?;

        let known: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();

        let unknown: Vec<String> = doc
            .iter()
            .map(|(key, _)| key.to_string())
            .filter(|key| !known.contains(&key.as_str()))
            .collect();
        for key in &unknown {
            tracing::warn!("Dropping unknown config section [{}]", key);
        }

        let missing = known.iter().any(|name| !doc.contains_key(name));

        Ok((settings, !unknown.is_empty() || missing))
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Device => toml::to_string_pretty(&s.device)?,
            ConfigSection::Catalog => toml::to_string_pretty(&s.catalog)?,
            ConfigSection::Stitch => toml::to_string_pretty(&s.stitch)?,
            ConfigSection::Upload => toml::to_string_pretty(&s.upload)?,
            ConfigSection::Pipeline => toml::to_string_pretty(&s.pipeline)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# pano-ingest configuration\n");
        output.push_str(
            "# This file is auto-generated. Unknown sections are dropped on load.\n",
        );

        for section in ConfigSection::ALL {
            output.push('\n');
            output.push_str(&format!("# {}\n", section.comment()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        for section in ConfigSection::ALL {
            assert!(content.contains(&format!("[{}]", section.table_name())));
        }
        assert!(content.contains("# Remote storage upload"));
    }

    #[test]
    fn generated_file_round_trips() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.settings_mut().stitch.camera_accessory = Some("kOnex3LensGuardS".to_string());
        manager.save().unwrap();

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(
            reloaded.settings().stitch.camera_accessory.as_deref(),
            Some("kOnex3LensGuardS")
        );
        assert_eq!(reloaded.settings().upload.args, manager.settings().upload.args);
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        fs::write(&config_path, "[upload]\nbucket = \"footage\"\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().upload.bucket, "footage");
        // Missing sections were filled in.
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[stitch]"));
        assert!(content.contains("bucket = \"footage\""));
    }

    #[test]
    fn unknown_sections_are_dropped() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        let mut content = fs::read_to_string(&config_path).unwrap();
        content.push_str("\n[legacy]\nfoo = 1\n");
        fs::write(&config_path, content).unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains("[legacy]"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("nope.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_rejects_invalid_settings() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        fs::write(&config_path, "[pipeline]\nupload_workers = 0\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        assert!(matches!(manager.load(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_or_default_never_writes() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_default().unwrap();
        assert!(!config_path.exists());
        assert!(!dir.path().join(".config").exists());
        assert_eq!(manager.settings().upload.bucket, Settings::default().upload.bucket);

        // A partial file with a stray section is read, not rewritten.
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        let partial = "[upload]\nbucket = \"footage\"\n\n[legacy]\nfoo = 1\n";
        fs::write(&config_path, partial).unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_default().unwrap();
        assert_eq!(manager.settings().upload.bucket, "footage");
        assert_eq!(fs::read_to_string(&config_path).unwrap(), partial);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn ensure_dirs_creates_staging_only_when_enabled() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("settings.toml"));
        let paths = &mut manager.settings_mut().paths;
        paths.output_folder = dir.path().join("out").to_string_lossy().into_owned();
        paths.logs_folder = dir.path().join("out/logs").to_string_lossy().into_owned();
        paths.staging_dir = dir.path().join("staging").to_string_lossy().into_owned();

        manager.ensure_dirs_exist().unwrap();
        assert!(dir.path().join("out/logs").is_dir());
        assert!(!dir.path().join("staging").exists());

        manager.settings_mut().device.copy_to_staging = true;
        manager.ensure_dirs_exist().unwrap();
        assert!(dir.path().join("staging").is_dir());
    }
}
