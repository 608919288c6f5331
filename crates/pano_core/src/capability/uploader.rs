//! Remote storage upload capability.

use std::path::PathBuf;
use std::time::Duration;

use super::process::{run_tool, tool_name, ToolOutput};
use super::CapabilityResult;
use crate::config::UploadSettings;
use crate::orchestrator::CancelHandle;

/// One file to put into remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub bucket: String,
    /// Destination key inside the bucket.
    pub key: String,
}

/// An object-storage uploader.
///
/// `Ok` means the remote copy is confirmed; only then may the local file
/// be removed.
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;

    /// Printable command line for the unit log, if the uploader is a process.
    fn command_line(&self, _request: &UploadRequest) -> Option<String> {
        None
    }

    fn upload(&self, request: &UploadRequest, cancel: &CancelHandle) -> CapabilityResult<ToolOutput>;
}

/// Uploader that runs a CLI with an argument template.
///
/// `{bucket}`, `{file}` and `{key}` are substituted in every argument.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    program: String,
    name: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandUploader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: tool_name(&program),
            program,
            args,
            timeout: None,
        }
    }

    /// Create an uploader from the `[upload]` settings section.
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone()).with_timeout(settings.timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Expand the argument template for a request.
    pub fn expand_args(&self, request: &UploadRequest) -> Vec<String> {
        let file = request.local_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{bucket}", &request.bucket)
                    .replace("{file}", &file)
                    .replace("{key}", &request.key)
            })
            .collect()
    }
}

impl Uploader for CommandUploader {
    fn name(&self) -> &str {
        &self.name
    }

    fn command_line(&self, request: &UploadRequest) -> Option<String> {
        Some(format!("{} {}", self.program, self.expand_args(request).join(" ")))
    }

    fn upload(&self, request: &UploadRequest, cancel: &CancelHandle) -> CapabilityResult<ToolOutput> {
        let args = self.expand_args(request);
        run_tool(&self.program, &args, cancel, self.timeout)
    }
}
