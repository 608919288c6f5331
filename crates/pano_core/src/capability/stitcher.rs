//! Stitching engine capability.

use std::path::PathBuf;
use std::time::Duration;

use super::process::{run_tool, tool_name, ToolOutput};
use super::{CapabilityError, CapabilityResult};
use crate::config::StitchSettings;
use crate::models::{Encoder, StitchType};
use crate::orchestrator::CancelHandle;

/// Everything the stitching engine needs for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchRequest {
    /// Lens tracks, primary first.
    pub inputs: Vec<PathBuf>,
    /// File the engine must write.
    pub output: PathBuf,
    pub model_path: PathBuf,
    pub stitch_type: StitchType,
    pub flowstate: bool,
    pub direction_lock: bool,
    pub fusion: bool,
    /// Bits per second.
    pub bitrate: u64,
    pub output_width: u32,
    pub output_height: u32,
    pub encoder: Encoder,
    pub camera_accessory: Option<String>,
}

impl StitchRequest {
    /// Build a request from the `[stitch]` settings section.
    pub fn from_settings(inputs: Vec<PathBuf>, output: PathBuf, settings: &StitchSettings) -> Self {
        Self {
            inputs,
            output,
            model_path: PathBuf::from(&settings.model_path),
            stitch_type: settings.stitch_type,
            flowstate: settings.flowstate,
            direction_lock: settings.direction_lock,
            fusion: settings.fusion,
            bitrate: settings.bitrate,
            output_width: settings.output_width,
            output_height: settings.output_height,
            encoder: settings.encoder,
            camera_accessory: settings
                .camera_accessory
                .clone()
                .filter(|a| !a.trim().is_empty()),
        }
    }

    /// Whether only one lens track is supplied.
    pub fn is_single_track(&self) -> bool {
        self.inputs.len() == 1
    }
}

/// A stitching engine.
///
/// Implementations block until the output is written or the attempt has
/// failed. They must not leave a file at `request.output` on failure.
pub trait Stitcher: Send + Sync {
    /// Tool name used in logs and errors.
    fn name(&self) -> &str;

    /// Whether a single lens track can be stitched on its own.
    fn supports_single_track(&self) -> bool {
        true
    }

    /// Printable command line for the unit log, if the engine is a process.
    fn command_line(&self, _request: &StitchRequest) -> Option<String> {
        None
    }

    /// Stitch `request.inputs` into `request.output`.
    fn stitch(&self, request: &StitchRequest, cancel: &CancelHandle) -> CapabilityResult<ToolOutput>;
}

/// Builds the stitcher command-line arguments for a request.
pub struct StitchArgsBuilder<'a> {
    request: &'a StitchRequest,
}

impl<'a> StitchArgsBuilder<'a> {
    pub fn new(request: &'a StitchRequest) -> Self {
        Self { request }
    }

    /// Build the complete argument list.
    pub fn build(&self) -> Vec<String> {
        let req = self.request;
        let mut args = Vec::new();

        args.push("--input".to_string());
        for input in &req.inputs {
            args.push(input.to_string_lossy().to_string());
        }

        args.push("--output".to_string());
        args.push(req.output.to_string_lossy().to_string());

        if req.stitch_type.needs_model() {
            args.push("--ai_model".to_string());
            args.push(req.model_path.to_string_lossy().to_string());
        }

        args.push("--stitch_type".to_string());
        args.push(req.stitch_type.as_arg().to_string());

        self.add_flags(&mut args);

        args.push("--bitrate".to_string());
        args.push(req.bitrate.to_string());

        args.push("--output_size".to_string());
        args.push(format!("{}x{}", req.output_width, req.output_height));

        if req.encoder == Encoder::H265 {
            args.push("--enable_h265_encoder".to_string());
        }

        if let Some(ref accessory) = req.camera_accessory {
            args.push("--camera_accessory".to_string());
            args.push(accessory.clone());
        }

        args
    }

    fn add_flags(&self, args: &mut Vec<String>) {
        let req = self.request;
        for (flag, value) in [
            ("--flowstate", req.flowstate),
            ("--directionlock", req.direction_lock),
            ("--stitchfusion", req.fusion),
        ] {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }
}

/// Stitcher backed by the vendor SDK command-line binary.
#[derive(Debug, Clone)]
pub struct CommandStitcher {
    binary: String,
    name: String,
    timeout: Option<Duration>,
}

impl CommandStitcher {
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        Self {
            name: tool_name(&binary),
            binary,
            timeout: None,
        }
    }

    /// Create a stitcher from the `[stitch]` settings section.
    pub fn from_settings(settings: &StitchSettings) -> Self {
        Self::new(settings.binary.clone()).with_timeout(settings.timeout())
    }

    /// Kill the engine if a stitch runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Stitcher for CommandStitcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn command_line(&self, request: &StitchRequest) -> Option<String> {
        let args = StitchArgsBuilder::new(request).build();
        Some(format!("{} {}", self.binary, args.join(" ")))
    }

    fn stitch(&self, request: &StitchRequest, cancel: &CancelHandle) -> CapabilityResult<ToolOutput> {
        if request.inputs.is_empty() {
            return Err(CapabilityError::unsupported(&self.name, "a request without inputs"));
        }
        let args = StitchArgsBuilder::new(request).build();
        run_tool(&self.binary, &args, cancel, self.timeout)
    }
}
