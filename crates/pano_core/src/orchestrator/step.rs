//! Pipeline step trait definition.
//!
//! All per-unit steps implement this trait, providing a consistent
//! interface for validation and execution.

use super::errors::StepResult;
use super::types::{Context, StepOutcome, UnitState};

/// Trait for pipeline steps.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the step's work
/// 3. `validate_output` - Verify the step produced valid output
///
/// `validate_input` sees the state so later steps can require the records
/// earlier steps left behind.
pub trait PipelineStep: Send + Sync {
    /// Get the step name (for logging and error context).
    fn name(&self) -> &str;

    /// Validate inputs before execution.
    fn validate_input(&self, ctx: &Context, state: &UnitState) -> StepResult<()>;

    /// Execute the step's main work and record results in `state`.
    ///
    /// Returns `StepOutcome::Skipped` when the step decided not to run.
    fn execute(&self, ctx: &Context, state: &mut UnitState) -> StepResult<StepOutcome>;

    /// Validate outputs after `execute` returned `Success`.
    fn validate_output(&self, ctx: &Context, state: &UnitState) -> StepResult<()>;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}
