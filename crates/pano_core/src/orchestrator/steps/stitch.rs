//! Stitch step - turns a unit's lens tracks into one panoramic file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::capability::StitchRequest;
use crate::models::{StitchArtifact, UnpairedPolicy};
use crate::naming::partial_path;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, StepOutcome, UnitState};

/// Stitch step: runs the stitching engine for one unit.
///
/// The engine writes to a partial file that is renamed to the final name
/// only after the engine reports success and the file is non-empty, so a
/// final-named file is always a complete stitch.
pub struct StitchStep;

impl StitchStep {
    pub fn new() -> Self {
        Self
    }

    fn final_path(&self, ctx: &Context) -> PathBuf {
        ctx.output_dir.join(&ctx.artifact_name)
    }

    /// Decide whether a single-track unit is stitched, skipped or failed.
    fn check_unpaired(&self, ctx: &Context) -> StepResult<Option<String>> {
        if ctx.unit.is_paired() {
            return Ok(None);
        }

        match ctx.settings.pipeline.unpaired {
            UnpairedPolicy::Skip => Ok(Some(format!(
                "unpaired {} track (policy: {})",
                ctx.unit.members()[0].role(),
                UnpairedPolicy::Skip
            ))),
            UnpairedPolicy::SingleTrack if !ctx.stitcher.supports_single_track() => {
                Err(StepError::unpaired(
                    ctx.unit.base_name(),
                    format!("{} cannot stitch a single track", ctx.stitcher.name()),
                ))
            }
            UnpairedPolicy::SingleTrack => {
                ctx.logger.warn(&format!(
                    "No partner for {}; stitching single track",
                    ctx.unit.members()[0].file_name()
                ));
                Ok(None)
            }
        }
    }
}

impl Default for StitchStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for StitchStep {
    fn name(&self) -> &str {
        "Stitch"
    }

    fn description(&self) -> &str {
        "Stitch lens tracks into a panoramic file"
    }

    fn validate_input(&self, ctx: &Context, _state: &UnitState) -> StepResult<()> {
        for path in ctx.unit.input_paths() {
            if !path.is_file() {
                return Err(StepError::file_not_found(path.display().to_string()));
            }
        }

        fs::create_dir_all(ctx.output_dir)
            .map_err(|e| StepError::io_error("creating output directory", e))?;

        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut UnitState) -> StepResult<StepOutcome> {
        if let Some(reason) = self.check_unpaired(ctx)? {
            state.skipped = Some(reason.clone());
            return Ok(StepOutcome::Skipped(reason));
        }

        let final_path = self.final_path(ctx);
        let part_path = partial_path(&final_path);

        if remove_if_present(&part_path)
            .map_err(|e| StepError::io_error("removing stale partial output", e))?
        {
            ctx.logger.warn(&format!(
                "Removed stale partial output {}",
                part_path.display()
            ));
        }
        if final_path.exists() {
            ctx.logger.warn(&format!(
                "{} exists from an earlier run; it is replaced only if this stitch succeeds",
                final_path.display()
            ));
        }

        let inputs = ctx
            .unit
            .input_paths()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();
        let request = StitchRequest::from_settings(inputs, part_path.clone(), &ctx.settings.stitch);

        if let Some(line) = ctx.stitcher.command_line(&request) {
            ctx.logger.command(&line);
        }
        ctx.logger.clear_tail();

        match ctx.stitcher.stitch(&request, ctx.cancel) {
            Ok(output) => ctx.record_output(output.lines()),
            Err(e) => {
                ctx.record_output(e.diagnostics().iter().map(|l| (l.as_str(), true)));
                ctx.logger.show_tail(ctx.stitcher.name());
                discard_partial(ctx, &part_path);
                return Err(StepError::stitch_failed(e));
            }
        }

        let written = fs::metadata(&part_path).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            discard_partial(ctx, &part_path);
            return Err(StepError::invalid_output(format!(
                "{} reported success but wrote no data to {}",
                ctx.stitcher.name(),
                part_path.display()
            )));
        }

        fs::rename(&part_path, &final_path)
            .map_err(|e| StepError::io_error("finalizing stitched output", e))?;

        ctx.logger.info(&format!(
            "Stitched {} ({} bytes)",
            final_path.display(),
            written
        ));

        state.artifact = Some(StitchArtifact {
            path: final_path,
            base_name: ctx.unit.base_name().to_string(),
            timestamp: ctx.unit.earliest_modified(),
        });

        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &UnitState) -> StepResult<()> {
        let artifact = state
            .artifact
            .as_ref()
            .ok_or_else(|| StepError::invalid_output("No artifact recorded"))?;

        let len = fs::metadata(&artifact.path)
            .map_err(|_| StepError::file_not_found(artifact.path.display().to_string()))?
            .len();
        if len == 0 {
            return Err(StepError::invalid_output(format!(
                "Artifact is empty: {}",
                artifact.path.display()
            )));
        }
        Ok(())
    }
}

/// Remove `path`; `Ok(false)` when it did not exist.
fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn discard_partial(ctx: &Context, part_path: &Path) {
    if let Err(e) = remove_if_present(part_path) {
        ctx.logger.warn(&format!(
            "Could not remove partial output {}: {}",
            part_path.display(),
            e
        ));
    }
}
