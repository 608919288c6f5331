//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Which physical lens a raw segment was recorded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackRole {
    /// Front lens track (`_00_` by default).
    Primary,
    /// Rear lens track (`_10_` by default).
    Secondary,
}

impl TrackRole {
    /// The role of the partner track.
    pub fn opposite(self) -> Self {
        match self {
            TrackRole::Primary => TrackRole::Secondary,
            TrackRole::Secondary => TrackRole::Primary,
        }
    }
}

impl std::fmt::Display for TrackRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackRole::Primary => write!(f, "primary"),
            TrackRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Stitch algorithm understood by the stitching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StitchType {
    /// Fixed calibration template.
    #[serde(rename = "TEMPLATE")]
    Template,
    /// Optical-flow stitching.
    #[serde(rename = "OPTFLOW")]
    OptFlow,
    /// Dynamic stitching for moving scenes.
    #[serde(rename = "DYNAMICSTITCH")]
    DynamicStitch,
    /// Model-assisted optical flow (requires a model file).
    #[default]
    #[serde(rename = "AIFLOW")]
    AiFlow,
}

impl StitchType {
    /// Value passed on the stitcher command line.
    pub fn as_arg(&self) -> &'static str {
        match self {
            StitchType::Template => "TEMPLATE",
            StitchType::OptFlow => "OPTFLOW",
            StitchType::DynamicStitch => "DYNAMICSTITCH",
            StitchType::AiFlow => "AIFLOW",
        }
    }

    /// Whether this stitch type needs the AI model file.
    pub fn needs_model(&self) -> bool {
        matches!(self, StitchType::AiFlow)
    }
}

impl std::fmt::Display for StitchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Video encoder used for the stitched output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    H264,
    #[default]
    H265,
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoder::H264 => write!(f, "h264"),
            Encoder::H265 => write!(f, "h265"),
        }
    }
}

/// What to do with a unit that has only one lens track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnpairedPolicy {
    /// Hand the single track to the stitcher in single-track mode.
    #[default]
    SingleTrack,
    /// Do not stitch; report the unit as skipped.
    Skip,
}

impl std::fmt::Display for UnpairedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnpairedPolicy::SingleTrack => write!(f, "single_track"),
            UnpairedPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Terminal state of a stitch unit after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOutcome {
    /// Stitched, uploaded, local artifact removed.
    Done,
    /// Stitched but the upload (or post-upload cleanup) failed; artifact kept.
    Retained,
    /// Stitching failed; no artifact exists.
    Failed,
    /// Not attempted (unpaired under the skip policy, or run cancelled).
    Skipped,
}

impl UnitOutcome {
    /// Get display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::Retained => "Retained",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stitch_type_serializes_as_sdk_name() {
        let json = serde_json::to_string(&StitchType::AiFlow).unwrap();
        assert_eq!(json, "\"AIFLOW\"");
        let parsed: StitchType = serde_json::from_str("\"DYNAMICSTITCH\"").unwrap();
        assert_eq!(parsed, StitchType::DynamicStitch);
    }

    #[test]
    fn unpaired_policy_uses_snake_case() {
        let parsed: UnpairedPolicy = serde_json::from_str("\"single_track\"").unwrap();
        assert_eq!(parsed, UnpairedPolicy::SingleTrack);
        assert_eq!(UnpairedPolicy::Skip.to_string(), "skip");
    }

    #[test]
    fn track_role_opposite() {
        assert_eq!(TrackRole::Primary.opposite(), TrackRole::Secondary);
        assert_eq!(TrackRole::Secondary.opposite(), TrackRole::Primary);
    }
}
