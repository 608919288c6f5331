//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Unit → Step → Capability → Detail

use std::io;

use thiserror::Error;

use crate::capability::CapabilityError;
use crate::catalog::CatalogError;

/// Pipeline error with run or unit context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source could not be cataloged; nothing was attempted.
    #[error("Catalog failed: {0}")]
    Catalog(#[from] CatalogError),

    /// A step of one unit failed.
    #[error("Unit '{unit}' failed at step '{step_name}': {source}")]
    StepFailed {
        unit: String,
        step_name: String,
        #[source]
        source: StepError,
    },

    /// The run was aborted before the unit finished.
    #[error("Unit '{unit}' was cancelled")]
    Cancelled { unit: String },

    /// Cancellation arrived before any unit was started.
    #[error("Run cancelled before any unit started")]
    RunCancelled,

    /// Failed to prepare the run (output or log directories).
    #[error("Setup failed: {message}")]
    SetupFailed { message: String },

    /// Two units of the run would write the same artifact.
    #[error("Artifact name '{name}' is planned for more than one unit")]
    NameCollision { name: String },
}

impl PipelineError {
    /// Create a step failed error.
    pub fn step_failed(
        unit: impl Into<String>,
        step_name: impl Into<String>,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            unit: unit.into(),
            step_name: step_name.into(),
            source,
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(unit: impl Into<String>) -> Self {
        Self::Cancelled { unit: unit.into() }
    }

    /// Create a setup failed error.
    pub fn setup_failed(message: impl Into<String>) -> Self {
        Self::SetupFailed {
            message: message.into(),
        }
    }

    /// Short description for the run summary (no unit prefix).
    pub fn summary_message(&self) -> String {
        match self {
            PipelineError::StepFailed {
                step_name, source, ..
            } => format!("{}: {}", step_name, source),
            PipelineError::Cancelled { .. } => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error from a pipeline step with operation context.
#[derive(Error, Debug)]
pub enum StepError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// The stitching engine failed.
    #[error("Stitch failed: {source}")]
    StitchFailed {
        #[source]
        source: CapabilityError,
    },

    /// The uploader failed; the artifact stays on disk.
    #[error("Upload of '{key}' failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: CapabilityError,
    },

    /// A single-track unit that cannot be stitched.
    #[error("Unpaired segment '{base_name}': {reason}")]
    UnpairedSegment { base_name: String, reason: String },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A required file was not found.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    /// A precondition was not met.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),
}

impl StepError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create a stitch failed error.
    pub fn stitch_failed(source: CapabilityError) -> Self {
        Self::StitchFailed { source }
    }

    /// Create an upload failed error.
    pub fn upload_failed(key: impl Into<String>, source: CapabilityError) -> Self {
        Self::UploadFailed {
            key: key.into(),
            source,
        }
    }

    /// Create an unpaired segment error.
    pub fn unpaired(base_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnpairedSegment {
            base_name: base_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Capability error behind this step error, if any.
    pub fn capability(&self) -> Option<&CapabilityError> {
        match self {
            StepError::StitchFailed { source } | StepError::UploadFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_displays_context() {
        let err = StepError::upload_failed(
            "REC001_001.mp4",
            CapabilityError::failed("b2", 1, vec!["403".to_string()]),
        );
        let msg = err.to_string();
        assert!(msg.contains("REC001_001.mp4"));
        assert!(msg.contains("b2 failed with exit code 1"));
        assert_eq!(err.capability().unwrap().diagnostics(), ["403".to_string()]);
    }

    #[test]
    fn pipeline_error_chains_context() {
        let step_err = StepError::file_not_found("/s/REC001_00_001.insv");
        let pipeline_err = PipelineError::step_failed("#1 REC001_001 (pair)", "Stitch", step_err);

        let msg = pipeline_err.to_string();
        assert!(msg.contains("REC001_001"));
        assert!(msg.contains("Stitch"));
        assert!(matches!(pipeline_err, PipelineError::StepFailed { .. }));
        assert!(pipeline_err.summary_message().starts_with("Stitch: Required file"));
    }

    #[test]
    fn cancelled_summary_is_short() {
        assert_eq!(PipelineError::cancelled("#2").summary_message(), "cancelled");
    }
}
