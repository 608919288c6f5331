//! Cleanup step - removes the local artifact after a confirmed upload.

use std::fs;
use std::io;

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, StepOutcome, UnitState};

/// Cleanup step: deletes the artifact only when the transfer succeeded.
pub struct CleanupStep;

impl CleanupStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CleanupStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for CleanupStep {
    fn name(&self) -> &str {
        "Cleanup"
    }

    fn description(&self) -> &str {
        "Delete the local file once the upload is confirmed"
    }

    fn validate_input(&self, _ctx: &Context, state: &UnitState) -> StepResult<()> {
        if state.skipped.is_some() {
            return Ok(());
        }
        if state.artifact.is_none() {
            return Err(StepError::precondition_failed("No artifact to clean up"));
        }
        if !state.upload_confirmed() {
            return Err(StepError::precondition_failed(
                "Upload not confirmed; artifact must be retained",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut UnitState) -> StepResult<StepOutcome> {
        let Some(artifact) = state.artifact.as_ref() else {
            return Ok(StepOutcome::Skipped("nothing was stitched".to_string()));
        };

        match fs::remove_file(&artifact.path) {
            Ok(()) => ctx
                .logger
                .info(&format!("Removed local copy {}", artifact.path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                ctx.logger.warn(&format!(
                    "{} was already gone",
                    artifact.path.display()
                ));
            }
            Err(e) => return Err(StepError::io_error("removing uploaded artifact", e)),
        }

        state.cleaned_up = true;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &UnitState) -> StepResult<()> {
        if let Some(artifact) = state.artifact.as_ref() {
            if artifact.path.exists() {
                return Err(StepError::invalid_output(format!(
                    "{} still exists",
                    artifact.path.display()
                )));
            }
        }
        Ok(())
    }
}
