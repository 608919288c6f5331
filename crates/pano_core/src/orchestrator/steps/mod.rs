//! Pipeline step implementations.
//!
//! Each step handles one phase of a unit: stitch, upload, local cleanup.

mod cleanup;
mod stitch;
mod transfer;

pub use cleanup::CleanupStep;
pub use stitch::StitchStep;
pub use transfer::TransferStep;
