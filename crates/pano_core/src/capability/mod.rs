//! External capabilities the pipeline drives but does not implement.
//!
//! The stitching engine and the object-storage uploader are both reached
//! through small traits so the coordinator can run against the real
//! command-line tools or against fakes in tests.
//!
//! ```text
//! Stitcher  ── CommandStitcher  (vendor SDK binary)
//! Uploader  ── CommandUploader  (b2 / any CLI with an argument template)
//! ```

mod process;
mod stitcher;
mod uploader;

pub use process::{run_tool, ToolOutput};
pub use stitcher::{CommandStitcher, StitchArgsBuilder, StitchRequest, Stitcher};
pub use uploader::{CommandUploader, UploadRequest, Uploader};

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by an external capability.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// The tool could not be started (missing binary, permissions).
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} failed with exit code {exit_code}")]
    Failed {
        tool: String,
        exit_code: i32,
        /// Tail of the tool's output.
        diagnostics: Vec<String>,
    },

    /// The tool exceeded its time limit and was killed.
    #[error("{tool} timed out after {after:?}")]
    TimedOut { tool: String, after: Duration },

    /// The tool was killed because the run was aborted.
    #[error("{tool} was killed (run aborted)")]
    Killed { tool: String },

    /// The capability cannot handle this request.
    #[error("{tool} does not support {what}")]
    Unsupported { tool: String, what: String },
}

impl CapabilityError {
    /// Create a failed error.
    pub fn failed(tool: impl Into<String>, exit_code: i32, diagnostics: Vec<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            exit_code,
            diagnostics,
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(tool: impl Into<String>, what: impl Into<String>) -> Self {
        Self::Unsupported {
            tool: tool.into(),
            what: what.into(),
        }
    }

    /// Output lines captured before the failure, if any.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            CapabilityError::Failed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

/// Result type for capability calls.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
