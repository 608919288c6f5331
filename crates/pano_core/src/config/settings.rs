//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field has a default, so a partial file is always valid input.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};
use crate::models::{Encoder, SegmentFormat, StitchType, UnpairedPolicy};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Source, staging, output and log locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Device mount handling.
    #[serde(default)]
    pub device: DeviceSettings,

    /// Raw segment filename convention.
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Stitching engine invocation.
    #[serde(default)]
    pub stitch: StitchSettings,

    /// Remote storage upload.
    #[serde(default)]
    pub upload: UploadSettings,

    /// Coordinator policies.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let catalog = &self.catalog;
        if catalog.primary_marker.is_empty() || catalog.secondary_marker.is_empty() {
            return Err("catalog markers must not be empty".to_string());
        }
        if catalog.primary_marker == catalog.secondary_marker {
            return Err(format!(
                "catalog.primary_marker and catalog.secondary_marker are both '{}'",
                catalog.primary_marker
            ));
        }
        if catalog.extension.trim_start_matches('.').is_empty() {
            return Err("catalog.extension must not be empty".to_string());
        }
        if self.stitch.bitrate == 0 {
            return Err("stitch.bitrate must be greater than zero".to_string());
        }
        if self.stitch.output_width == 0 || self.stitch.output_height == 0 {
            return Err("stitch.output_width/output_height must be greater than zero".to_string());
        }
        if self.pipeline.upload_workers == 0 {
            return Err("pipeline.upload_workers must be at least 1".to_string());
        }
        if !self.pipeline.retain_on_upload_failure {
            return Err(
                "pipeline.retain_on_upload_failure = false is not supported; \
                 artifacts are only deleted after a confirmed upload"
                    .to_string(),
            );
        }
        if self.upload.program.is_empty() {
            return Err("upload.program must not be empty".to_string());
        }
        Ok(())
    }
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory scanned for raw segments (usually the camera mount).
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Local copy of the raw segments when staging is enabled.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Working directory for stitched artifacts.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Folder for per-unit logs and run summaries.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_source_dir() -> String {
    "/mnt/camera".to_string()
}

fn default_staging_dir() -> String {
    home_dir().join("Insta360Downloads").display().to_string()
}

fn default_output_folder() -> String {
    home_dir().join("Insta360Stitched").display().to_string()
}

fn default_logs_folder() -> String {
    home_dir().join("Insta360Stitched").join("logs").display().to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            staging_dir: default_staging_dir(),
            output_folder: default_output_folder(),
            logs_folder: default_logs_folder(),
        }
    }
}

impl PathSettings {
    pub fn source_dir(&self) -> &Path {
        Path::new(&self.source_dir)
    }

    pub fn staging_dir(&self) -> &Path {
        Path::new(&self.staging_dir)
    }

    pub fn output_folder(&self) -> &Path {
        Path::new(&self.output_folder)
    }

    pub fn logs_folder(&self) -> &Path {
        Path::new(&self.logs_folder)
    }
}

/// Device mount configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Seconds between checks for the mount point.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up waiting after this many seconds (0 = wait forever).
    #[serde(default)]
    pub timeout_secs: u64,

    /// Copy segments to `paths.staging_dir` and scan the copy.
    #[serde(default)]
    pub copy_to_staging: bool,
}

fn default_poll_interval() -> u64 {
    2
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: 0,
            copy_to_staging: false,
        }
    }
}

impl DeviceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Raw segment filename convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Marker for the primary (front) lens track.
    #[serde(default = "default_primary_marker")]
    pub primary_marker: String,

    /// Marker for the secondary (rear) lens track.
    #[serde(default = "default_secondary_marker")]
    pub secondary_marker: String,

    /// Raw segment extension.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Abort the scan on files with the extension but no marker.
    #[serde(default)]
    pub strict_names: bool,
}

fn default_primary_marker() -> String {
    "_00_".to_string()
}

fn default_secondary_marker() -> String {
    "_10_".to_string()
}

fn default_extension() -> String {
    "insv".to_string()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            primary_marker: default_primary_marker(),
            secondary_marker: default_secondary_marker(),
            extension: default_extension(),
            strict_names: false,
        }
    }
}

impl CatalogSettings {
    /// Filename convention described by this section.
    pub fn format(&self) -> SegmentFormat {
        SegmentFormat::new(
            self.primary_marker.clone(),
            self.secondary_marker.clone(),
            self.extension.trim_start_matches('.'),
        )
    }
}

/// Stitching engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchSettings {
    /// Stitcher executable.
    #[serde(default = "default_stitch_binary")]
    pub binary: String,

    /// AI stitch model file.
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Stitch algorithm.
    #[serde(default)]
    pub stitch_type: StitchType,

    /// FlowState stabilization.
    #[serde(default = "default_true")]
    pub flowstate: bool,

    /// Direction lock.
    #[serde(default = "default_true")]
    pub direction_lock: bool,

    /// Stitch fusion.
    #[serde(default = "default_true")]
    pub fusion: bool,

    /// Output bitrate in bits per second.
    #[serde(default = "default_bitrate")]
    pub bitrate: u64,

    #[serde(default = "default_output_width")]
    pub output_width: u32,

    #[serde(default = "default_output_height")]
    pub output_height: u32,

    /// Output encoder.
    #[serde(default)]
    pub encoder: Encoder,

    /// Lens accessory fitted to the camera (e.g. a lens guard), if any.
    #[serde(default)]
    pub camera_accessory: Option<String>,

    /// Extension of stitched files.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    /// Kill a stitch running longer than this (0 = no limit).
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_stitch_binary() -> String {
    "/opt/Insta360/MediaSDK/bin/stitcher_demo".to_string()
}

fn default_model_path() -> String {
    "/opt/Insta360/MediaSDK/modelfile/ai_stitch_model.ins".to_string()
}

fn default_bitrate() -> u64 {
    100 * 1000 * 1000
}

fn default_output_width() -> u32 {
    7680
}

fn default_output_height() -> u32 {
    3840
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

impl Default for StitchSettings {
    fn default() -> Self {
        Self {
            binary: default_stitch_binary(),
            model_path: default_model_path(),
            stitch_type: StitchType::default(),
            flowstate: true,
            direction_lock: true,
            fusion: true,
            bitrate: default_bitrate(),
            output_width: default_output_width(),
            output_height: default_output_height(),
            encoder: Encoder::default(),
            camera_accessory: None,
            output_extension: default_output_extension(),
            timeout_secs: 0,
        }
    }
}

impl StitchSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Upload tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Upload executable.
    #[serde(default = "default_upload_program")]
    pub program: String,

    /// Argument template; `{bucket}`, `{file}` and `{key}` are substituted.
    #[serde(default = "default_upload_args")]
    pub args: Vec<String>,

    /// Destination bucket.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Prepended verbatim to every destination key.
    #[serde(default)]
    pub key_prefix: String,

    /// Kill an upload running longer than this (0 = no limit).
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_upload_program() -> String {
    "b2".to_string()
}

fn default_upload_args() -> Vec<String> {
    ["upload-file", "{bucket}", "{file}", "{key}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_bucket() -> String {
    "360-videos-insta360".to_string()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            program: default_upload_program(),
            args: default_upload_args(),
            bucket: default_bucket(),
            key_prefix: String::new(),
            timeout_secs: 0,
        }
    }
}

impl UploadSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Coordinator policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Handling of units with a single lens track.
    #[serde(default)]
    pub unpaired: UnpairedPolicy,

    /// Upload workers running alongside stitching (1 = sequential).
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,

    /// Keep the local artifact when its upload fails. Must stay `true`.
    #[serde(default = "default_true")]
    pub retain_on_upload_failure: bool,
}

fn default_upload_workers() -> usize {
    1
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            unpaired: UnpairedPolicy::default(),
            upload_workers: default_upload_workers(),
            retain_on_upload_failure: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for console and unit logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep external tool output out of the unit log unless a step fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines kept for failure reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix unit log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

impl LoggingSettings {
    /// Logger configuration for per-unit logs.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            error_tail: self.error_tail as usize,
            show_timestamps: self.show_timestamps,
        }
    }
}

/// Names of config sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Device,
    Catalog,
    Stitch,
    Upload,
    Pipeline,
    Logging,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 7] = [
        ConfigSection::Paths,
        ConfigSection::Device,
        ConfigSection::Catalog,
        ConfigSection::Stitch,
        ConfigSection::Upload,
        ConfigSection::Pipeline,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Device => "device",
            ConfigSection::Catalog => "catalog",
            ConfigSection::Stitch => "stitch",
            ConfigSection::Upload => "upload",
            ConfigSection::Pipeline => "pipeline",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Source, staging, output and log directories",
            ConfigSection::Device => "Camera mount handling",
            ConfigSection::Catalog => "Raw segment filename convention",
            ConfigSection::Stitch => "Stitching engine options",
            ConfigSection::Upload => "Remote storage upload",
            ConfigSection::Pipeline => "Pairing and retention policies",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}
