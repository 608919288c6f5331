//! Stitch units and the records produced while processing them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::TrackRole;
use super::segment::RawSegment;

/// One or two raw segments that are stitched into a single panoramic file.
///
/// Two-member units always hold the primary track first. Units are created
/// by the pair resolver and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchUnit {
    /// Position of this unit in the run (0-based).
    index: usize,
    /// Member segments, primary first.
    members: Vec<RawSegment>,
}

impl StitchUnit {
    /// Create a two-member unit.
    pub(crate) fn pair(index: usize, primary: RawSegment, secondary: RawSegment) -> Self {
        debug_assert_eq!(primary.role(), TrackRole::Primary);
        debug_assert_eq!(secondary.role(), TrackRole::Secondary);
        Self {
            index,
            members: vec![primary, secondary],
        }
    }

    /// Create a unit holding a segment without a partner.
    pub(crate) fn single(index: usize, segment: RawSegment) -> Self {
        Self {
            index,
            members: vec![segment],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn members(&self) -> &[RawSegment] {
        &self.members
    }

    /// Whether both lens tracks are present.
    pub fn is_paired(&self) -> bool {
        self.members.len() == 2
    }

    /// The primary member, if any.
    pub fn primary(&self) -> Option<&RawSegment> {
        self.members.iter().find(|m| m.role() == TrackRole::Primary)
    }

    /// The secondary member, if any.
    pub fn secondary(&self) -> Option<&RawSegment> {
        self.members.iter().find(|m| m.role() == TrackRole::Secondary)
    }

    /// Recording base-name shared by all members.
    pub fn base_name(&self) -> &str {
        self.members[0].base_name()
    }

    /// Earliest modification time among the members.
    pub fn earliest_modified(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.modified()).min()
    }

    /// Input paths in stitch order.
    pub fn input_paths(&self) -> Vec<&Path> {
        self.members.iter().map(|m| m.path()).collect()
    }

    /// Short label for logs: `#1 REC001_001 (pair)`.
    pub fn label(&self) -> String {
        let kind = if self.is_paired() {
            "pair".to_string()
        } else {
            format!("{} only", self.members[0].role())
        };
        format!("#{} {} ({})", self.index + 1, self.base_name(), kind)
    }
}

/// A stitched panoramic file on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchArtifact {
    /// Final local path of the stitched file.
    pub path: PathBuf,
    /// Recording base-name the file name was derived from.
    pub base_name: String,
    /// Timestamp the file name was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StitchArtifact {
    /// File name component of the artifact path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.base_name.clone())
    }
}

/// Outcome of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Destination bucket/container.
    pub bucket: String,
    /// Destination key inside the bucket.
    pub destination_key: String,
    /// Whether the uploader confirmed the upload.
    pub success: bool,
    /// Failure description from the uploader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferRecord {
    /// Record a confirmed upload.
    pub fn succeeded(bucket: impl Into<String>, destination_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            destination_key: destination_key.into(),
            success: true,
            error: None,
        }
    }

    /// Record a failed upload.
    pub fn failed(
        bucket: impl Into<String>,
        destination_key: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            destination_key: destination_key.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}
