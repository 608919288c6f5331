//! Orchestrator module - per-unit pipeline and run coordination.
//!
//! Each stitch unit runs through a sequence of steps:
//! 1. Stitch - invoke the stitching engine, publish the artifact
//! 2. Transfer - upload the artifact
//! 3. Cleanup - delete the local artifact once the upload is confirmed
//!
//! The [`Coordinator`] catalogs the source, resolves pairs, and runs the
//! steps for every unit with per-unit failure isolation.

mod coordinator;
mod errors;
mod pipeline;
mod step;
pub mod steps;
mod summary;
mod types;

#[cfg(test)]
mod testing;

pub use coordinator::{Coordinator, RunPlan};
pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{CleanupStep, StitchStep, TransferStep};
pub use summary::{RunSummary, UnitReport, SUMMARY_FILE};
pub use types::{Context, StepOutcome, UnitState};

/// Full per-unit pipeline: stitch, upload, clean up.
pub fn create_unit_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(StitchStep::new())
        .with_step(TransferStep::new())
        .with_step(CleanupStep::new())
}

/// Stitch only; used when uploads run on the worker pool.
pub fn create_stitch_pipeline() -> Pipeline {
    Pipeline::new().with_step(StitchStep::new())
}

/// Upload and clean up an already stitched unit.
pub fn create_delivery_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(TransferStep::new())
        .with_step(CleanupStep::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_pipeline_has_three_steps() {
        assert_eq!(
            create_unit_pipeline().step_names(),
            vec!["Stitch", "Transfer", "Cleanup"]
        );
    }

    #[test]
    fn split_pipelines_cover_the_unit_pipeline() {
        let stitch = create_stitch_pipeline();
        let delivery = create_delivery_pipeline();
        let full = create_unit_pipeline();

        let mut names = stitch.step_names();
        names.extend(delivery.step_names());
        assert_eq!(names, full.step_names());
    }
}
