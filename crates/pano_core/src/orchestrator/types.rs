//! Core types for the orchestrator pipeline.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::pipeline::CancelHandle;
use crate::capability::{Stitcher, Uploader};
use crate::config::Settings;
use crate::logging::UnitLogger;
use crate::models::{StitchArtifact, StitchUnit, TransferRecord};
use crate::naming::artifact_file_name;

/// Read-only context passed to pipeline steps.
///
/// Borrowed from the coordinator for the duration of one unit. Mutable
/// results go in `UnitState`.
pub struct Context<'a> {
    /// The unit being processed.
    pub unit: &'a StitchUnit,
    /// Run settings.
    pub settings: &'a Settings,
    pub stitcher: &'a dyn Stitcher,
    pub uploader: &'a dyn Uploader,
    /// Shared run cancellation.
    pub cancel: &'a CancelHandle,
    /// Folder receiving stitched artifacts.
    pub output_dir: &'a Path,
    /// Per-unit logger.
    pub logger: Arc<UnitLogger>,
    /// File name of the stitched artifact, unique within the run.
    pub artifact_name: String,
}

impl<'a> Context<'a> {
    pub fn new(
        unit: &'a StitchUnit,
        settings: &'a Settings,
        stitcher: &'a dyn Stitcher,
        uploader: &'a dyn Uploader,
        cancel: &'a CancelHandle,
        output_dir: &'a Path,
        logger: Arc<UnitLogger>,
    ) -> Self {
        let artifact_name = artifact_file_name(unit, &settings.stitch.output_extension);
        Self {
            unit,
            settings,
            stitcher,
            uploader,
            cancel,
            output_dir,
            logger,
            artifact_name,
        }
    }

    /// Use the name planned for this unit across the whole run.
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into();
        self
    }

    /// Unit label for logs and errors, e.g. `#1 REC001_001 (pair)`.
    pub fn label(&self) -> String {
        self.unit.label()
    }

    /// Feed captured tool output into the unit log.
    pub fn record_output<'l>(&self, lines: impl IntoIterator<Item = (&'l str, bool)>) {
        for (line, is_stderr) in lines {
            self.logger.output_line(line, is_stderr);
        }
    }
}

/// Mutable unit state that accumulates results from pipeline steps.
///
/// Steps add their record and do not overwrite earlier ones. The
/// coordinator classifies the unit's outcome from this state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitState {
    pub unit_index: usize,
    /// When processing started (RFC 3339, local time).
    pub started_at: Option<String>,
    /// Set by Stitch once the final-named file exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StitchArtifact>,
    /// Set by Transfer, on success and on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferRecord>,
    /// Set by Cleanup once the local artifact is removed.
    pub cleaned_up: bool,
    /// Why the unit was not stitched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl UnitState {
    pub fn new(unit_index: usize) -> Self {
        Self {
            unit_index,
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Whether the uploader confirmed the transfer.
    pub fn upload_confirmed(&self) -> bool {
        self.transfer.as_ref().is_some_and(|t| t.success)
    }
}

/// Result of executing a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed its work.
    Success,
    /// Step did not run, with the reason.
    Skipped(String),
}
