//! Raw segment records and the filename convention that classifies them.
//!
//! Cameras write each lens to its own file and mark the lens in the name:
//!
//! ```text
//! VID_20240101_120000_00_001.insv   primary (front lens)
//! VID_20240101_120000_10_001.insv   secondary (rear lens)
//! ```
//!
//! The recording base-name is the stem with the lens marker collapsed to a
//! single `_` (`VID_20240101_120000_001`), so both tracks share it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::TrackRole;

/// Errors from parsing a segment filename.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentNameError {
    /// The file does not carry the raw-segment extension.
    #[error("'{name}' does not have the .{extension} extension")]
    WrongExtension { name: String, extension: String },

    /// The file has the right extension but no lens marker.
    #[error("'{name}' contains no lens marker ('{primary}' or '{secondary}')")]
    MissingMarker {
        name: String,
        primary: String,
        secondary: String,
    },
}

/// Filename convention for raw segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFormat {
    /// Marker identifying the primary lens track.
    pub primary_marker: String,
    /// Marker identifying the secondary lens track.
    pub secondary_marker: String,
    /// File extension without the dot (matched case-insensitively).
    pub extension: String,
}

impl Default for SegmentFormat {
    fn default() -> Self {
        Self {
            primary_marker: "_00_".to_string(),
            secondary_marker: "_10_".to_string(),
            extension: "insv".to_string(),
        }
    }
}

impl SegmentFormat {
    /// Create a format with custom markers and extension.
    pub fn new(
        primary_marker: impl Into<String>,
        secondary_marker: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            primary_marker: primary_marker.into(),
            secondary_marker: secondary_marker.into(),
            extension: extension.into(),
        }
    }

    /// Whether a filename carries the raw-segment extension.
    pub fn has_extension(&self, file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(&self.extension))
    }

    fn marker(&self, role: TrackRole) -> &str {
        match role {
            TrackRole::Primary => &self.primary_marker,
            TrackRole::Secondary => &self.secondary_marker,
        }
    }

    /// Parse a filename into its recording base-name and track role.
    ///
    /// The lens marker is the last marker occurrence in the stem, so
    /// timestamps earlier in the name can never be mistaken for it.
    pub fn parse(&self, file_name: &str) -> Result<SegmentName, SegmentNameError> {
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && ext.eq_ignore_ascii_case(&self.extension) => {
                (stem, ext)
            }
            _ => {
                return Err(SegmentNameError::WrongExtension {
                    name: file_name.to_string(),
                    extension: self.extension.clone(),
                })
            }
        };

        let primary_at = stem.rfind(self.primary_marker.as_str());
        let secondary_at = stem.rfind(self.secondary_marker.as_str());

        let (role, at) = match (primary_at, secondary_at) {
            (Some(p), Some(s)) if s > p => (TrackRole::Secondary, s),
            (Some(p), _) => (TrackRole::Primary, p),
            (None, Some(s)) => (TrackRole::Secondary, s),
            (None, None) => {
                return Err(SegmentNameError::MissingMarker {
                    name: file_name.to_string(),
                    primary: self.primary_marker.clone(),
                    secondary: self.secondary_marker.clone(),
                })
            }
        };

        let head = &stem[..at];
        let tail = &stem[at + self.marker(role).len()..];

        let base_name = match (head.is_empty(), tail.is_empty()) {
            (true, _) => tail.to_string(),
            (_, true) => head.to_string(),
            _ => format!("{}_{}", head, tail),
        };
        let partner_file_name = format!("{}{}{}.{}", head, self.marker(role.opposite()), tail, ext);

        Ok(SegmentName {
            base_name,
            role,
            partner_file_name,
        })
    }
}

/// Result of parsing a segment filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    /// Recording base-name shared by both lens tracks.
    pub base_name: String,
    /// Lens role of this file.
    pub role: TrackRole,
    /// Filename of the other lens track of the same recording.
    pub partner_file_name: String,
}

/// One lens track discovered on disk.
///
/// Identity is the absolute path. Records are re-derived on every run and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSegment {
    path: PathBuf,
    base_name: String,
    role: TrackRole,
    partner_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
}

impl RawSegment {
    /// Build a segment from its parts.
    pub fn new(
        path: impl Into<PathBuf>,
        base_name: impl Into<String>,
        role: TrackRole,
        partner_path: impl Into<PathBuf>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.into(),
            base_name: base_name.into(),
            role,
            partner_path: partner_path.into(),
            modified,
        }
    }

    /// Build a segment from a parsed filename; the partner lives in the same directory.
    pub fn from_name(path: impl Into<PathBuf>, name: &SegmentName, modified: Option<DateTime<Utc>>) -> Self {
        let path = path.into();
        let partner_path = path.with_file_name(&name.partner_file_name);
        Self::new(path, name.base_name.clone(), name.role, partner_path, modified)
    }

    /// Parse the filename of `path` with `format`.
    pub fn parse(
        path: impl Into<PathBuf>,
        format: &SegmentFormat,
        modified: Option<DateTime<Utc>>,
    ) -> Result<Self, SegmentNameError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = format.parse(&file_name)?;
        Ok(Self::from_name(path, &name, modified))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    pub fn is_primary(&self) -> bool {
        self.role == TrackRole::Primary
    }

    /// Path where the other lens track of this recording would be.
    pub fn partner_path(&self) -> &Path {
        &self.partner_path
    }

    /// File modification time, when the filesystem reported one.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Filename component for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
