//! Data models for pano-ingest.
//!
//! This module contains the core data structures shared by every stage:
//! - Enums for track roles, stitch options, unit outcomes
//! - Raw segments and the filename convention that classifies them
//! - Stitch units, artifacts, and transfer records

mod enums;
mod segment;
mod unit;

// Re-export all public types
pub use enums::{Encoder, StitchType, TrackRole, UnitOutcome, UnpairedPolicy};
pub use segment::{RawSegment, SegmentFormat, SegmentName, SegmentNameError};
pub use unit::{StitchArtifact, StitchUnit, TransferRecord};
