//! Fakes and fixtures shared by orchestrator unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use super::pipeline::CancelHandle;
use super::types::Context;
use crate::capability::{
    CapabilityError, CapabilityResult, StitchRequest, Stitcher, ToolOutput, UploadRequest,
    Uploader,
};
use crate::config::Settings;
use crate::logging::{LogCallback, LogConfig, UnitLogger};
use crate::models::{RawSegment, SegmentFormat, StitchUnit};
use crate::pairing::resolve_pairs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchBehavior {
    Succeed,
    Fail,
    SucceedWithoutOutput,
    /// Succeeds, but reports no single-track support.
    PairsOnly,
    /// Writes part of the output, then hits its time limit.
    TimeOut,
}

pub struct FakeStitcher {
    behavior: StitchBehavior,
    requests: Mutex<Vec<StitchRequest>>,
}

impl FakeStitcher {
    pub fn new(behavior: StitchBehavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<StitchRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Stitcher for FakeStitcher {
    fn name(&self) -> &str {
        "fake-stitcher"
    }

    fn supports_single_track(&self) -> bool {
        self.behavior != StitchBehavior::PairsOnly
    }

    fn stitch(&self, request: &StitchRequest, _cancel: &CancelHandle) -> CapabilityResult<ToolOutput> {
        self.requests.lock().push(request.clone());
        match self.behavior {
            StitchBehavior::Fail => {
                // A crashed engine may leave a partial file behind.
                let _ = fs::write(&request.output, b"partial");
                Err(CapabilityError::failed(
                    "fake-stitcher",
                    1,
                    vec!["decoder error".to_string()],
                ))
            }
            StitchBehavior::SucceedWithoutOutput => Ok(ToolOutput::default()),
            StitchBehavior::TimeOut => {
                let _ = fs::write(&request.output, b"partial");
                Err(CapabilityError::TimedOut {
                    tool: "fake-stitcher".to_string(),
                    after: Duration::from_secs(5),
                })
            }
            StitchBehavior::Succeed | StitchBehavior::PairsOnly => {
                fs::write(&request.output, b"stitched panorama").map_err(|source| {
                    CapabilityError::Launch {
                        tool: "fake-stitcher".to_string(),
                        source,
                    }
                })?;
                Ok(ToolOutput {
                    exit_code: 0,
                    stdout: vec!["done".to_string()],
                    stderr: Vec::new(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehavior {
    Succeed,
    Fail,
    TimeOut,
}

pub struct FakeUploader {
    behavior: UploadBehavior,
    uploads: Mutex<Vec<UploadRequest>>,
}

impl FakeUploader {
    pub fn new(behavior: UploadBehavior) -> Self {
        Self {
            behavior,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads.lock().iter().map(|r| r.key.clone()).collect()
    }
}

impl Uploader for FakeUploader {
    fn name(&self) -> &str {
        "fake-uploader"
    }

    fn upload(&self, request: &UploadRequest, _cancel: &CancelHandle) -> CapabilityResult<ToolOutput> {
        self.uploads.lock().push(request.clone());
        match self.behavior {
            UploadBehavior::Succeed => Ok(ToolOutput::default()),
            UploadBehavior::Fail => Err(CapabilityError::failed(
                "fake-uploader",
                1,
                vec!["401 unauthorized".to_string()],
            )),
            UploadBehavior::TimeOut => Err(CapabilityError::TimedOut {
                tool: "fake-uploader".to_string(),
                after: Duration::from_millis(1500),
            }),
        }
    }
}

/// One unit with real input files in a temporary tree.
pub struct Fixture {
    pub dir: TempDir,
    pub settings: Settings,
    pub unit: StitchUnit,
    pub stitcher: FakeStitcher,
    pub uploader: FakeUploader,
    pub cancel: CancelHandle,
    out_dir: PathBuf,
    logger: Arc<UnitLogger>,
    lines: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    /// A paired unit `REC001_00_001` + `REC001_10_001`.
    pub fn new() -> Self {
        Self::with_files(&["REC001_00_001.insv", "REC001_10_001.insv"])
    }

    /// A primary track without its partner.
    pub fn single() -> Self {
        Self::with_files(&["REC001_00_001.insv"])
    }

    fn with_files(names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();

        let format = SegmentFormat::default();
        let segments: Vec<RawSegment> = names
            .iter()
            .map(|name| {
                let path = source.join(name);
                fs::write(&path, b"raw").unwrap();
                RawSegment::parse(path, &format, None).unwrap()
            })
            .collect();
        let unit = resolve_pairs(&segments).units.remove(0);

        let out_dir = dir.path().join("out");
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let callback: LogCallback = Arc::new(move |line: &str| sink.lock().push(line.to_string()));

        Self {
            dir,
            settings: Settings::default(),
            unit,
            stitcher: FakeStitcher::new(StitchBehavior::Succeed),
            uploader: FakeUploader::new(UploadBehavior::Succeed),
            cancel: CancelHandle::new(),
            out_dir,
            logger: Arc::new(UnitLogger::detached("test-unit", config, Some(callback))),
            lines,
        }
    }

    pub fn stitch(mut self, behavior: StitchBehavior) -> Self {
        self.stitcher = FakeStitcher::new(behavior);
        self
    }

    pub fn upload(mut self, behavior: UploadBehavior) -> Self {
        self.uploader = FakeUploader::new(behavior);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Every line written to the unit log so far.
    pub fn log_lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn context(&self) -> Context<'_> {
        Context::new(
            &self.unit,
            &self.settings,
            &self.stitcher,
            &self.uploader,
            &self.cancel,
            &self.out_dir,
            Arc::clone(&self.logger),
        )
    }
}
