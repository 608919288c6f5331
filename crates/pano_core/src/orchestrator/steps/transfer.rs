//! Transfer step - uploads a stitched artifact to remote storage.

use crate::capability::UploadRequest;
use crate::models::TransferRecord;
use crate::naming::destination_key;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, StepOutcome, UnitState};

/// Transfer step: one upload attempt, recorded in the unit state either way.
pub struct TransferStep;

impl TransferStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TransferStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for TransferStep {
    fn name(&self) -> &str {
        "Transfer"
    }

    fn description(&self) -> &str {
        "Upload the stitched file to remote storage"
    }

    fn validate_input(&self, _ctx: &Context, state: &UnitState) -> StepResult<()> {
        if state.skipped.is_some() {
            return Ok(());
        }
        let artifact = state
            .artifact
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("No stitched artifact to upload"))?;
        if !artifact.path.is_file() {
            return Err(StepError::file_not_found(artifact.path.display().to_string()));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut UnitState) -> StepResult<StepOutcome> {
        let Some(artifact) = state.artifact.as_ref() else {
            return Ok(StepOutcome::Skipped("nothing was stitched".to_string()));
        };

        let upload = &ctx.settings.upload;
        let request = UploadRequest {
            local_path: artifact.path.clone(),
            bucket: upload.bucket.clone(),
            key: destination_key(&upload.key_prefix, &artifact.file_name()),
        };

        ctx.logger.info(&format!(
            "Uploading {} to {}/{}",
            artifact.file_name(),
            request.bucket,
            request.key
        ));
        if let Some(line) = ctx.uploader.command_line(&request) {
            ctx.logger.command(&line);
        }
        ctx.logger.clear_tail();

        match ctx.uploader.upload(&request, ctx.cancel) {
            Ok(output) => {
                ctx.record_output(output.lines());
                state.transfer = Some(TransferRecord::succeeded(&request.bucket, &request.key));
                Ok(StepOutcome::Success)
            }
            Err(e) => {
                ctx.record_output(e.diagnostics().iter().map(|l| (l.as_str(), true)));
                ctx.logger.show_tail(ctx.uploader.name());
                ctx.logger.warn(&format!(
                    "Keeping {} for a later upload",
                    artifact.path.display()
                ));
                state.transfer = Some(TransferRecord::failed(
                    &request.bucket,
                    &request.key,
                    e.to_string(),
                ));
                Err(StepError::upload_failed(request.key, e))
            }
        }
    }

    fn validate_output(&self, _ctx: &Context, state: &UnitState) -> StepResult<()> {
        if !state.upload_confirmed() {
            return Err(StepError::invalid_output("Upload not confirmed"));
        }
        Ok(())
    }
}
