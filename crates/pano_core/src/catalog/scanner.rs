//! Recursive segment scanner.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::config::CatalogSettings;
use crate::models::{RawSegment, SegmentFormat, SegmentNameError};

/// Errors that abort a catalog scan.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The source directory is missing (device not mounted, wrong path).
    #[error("Source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source path exists but is not a directory.
    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Strict mode: a file with the segment extension could not be classified.
    #[error("Unrecognized segment {path}: {source}")]
    UnrecognizedSegment {
        path: PathBuf,
        #[source]
        source: SegmentNameError,
    },
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A file that looked like a segment but could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of one catalog scan.
#[derive(Debug, Clone, Default)]
pub struct CatalogScan {
    /// Absolute root that was scanned.
    pub root: PathBuf,
    /// Classified segments, sorted by path, no duplicates.
    pub segments: Vec<RawSegment>,
    /// Files with the segment extension that carried no lens marker.
    pub rejected: Vec<RejectedFile>,
}

/// Scanner for raw segment files.
#[derive(Debug, Clone)]
pub struct SegmentCatalog {
    format: SegmentFormat,
    strict: bool,
    ignore_names: Vec<String>,
}

impl SegmentCatalog {
    /// Create a catalog for the given filename convention.
    ///
    /// Hidden entries and common system folders are ignored.
    pub fn new(format: SegmentFormat) -> Self {
        Self {
            format,
            strict: false,
            ignore_names: vec![
                "System Volume Information".to_string(),
                "$RECYCLE.BIN".to_string(),
                "Thumbs.db".to_string(),
            ],
        }
    }

    /// Create a catalog from the `[catalog]` settings section.
    pub fn from_settings(settings: &CatalogSettings) -> Self {
        Self::new(settings.format()).strict(settings.strict_names)
    }

    /// Fail the scan on unclassifiable names instead of rejecting them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Filename convention in use.
    pub fn format(&self) -> &SegmentFormat {
        &self.format
    }

    /// Scan `root` recursively for raw segments.
    ///
    /// Symlinks are not followed. Unreadable entries below the root are
    /// logged and skipped; a missing root is fatal.
    pub fn scan(&self, root: &Path) -> CatalogResult<CatalogScan> {
        let root = root
            .canonicalize()
            .map_err(|source| CatalogError::SourceUnavailable {
                path: root.to_path_buf(),
                source,
            })?;

        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root));
        }

        let mut segments = Vec::new();
        let mut rejected = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry during scan: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !self.format.has_extension(&file_name) {
                continue;
            }

            match self.format.parse(&file_name) {
                Ok(name) => {
                    let modified = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from);
                    segments.push(RawSegment::from_name(entry.path(), &name, modified));
                }
                Err(source) => {
                    if self.strict {
                        return Err(CatalogError::UnrecognizedSegment {
                            path: entry.path().to_path_buf(),
                            source,
                        });
                    }
                    tracing::warn!("Rejected {}: {}", entry.path().display(), source);
                    rejected.push(RejectedFile {
                        path: entry.path().to_path_buf(),
                        reason: source.to_string(),
                    });
                }
            }
        }

        segments.sort_by(|a, b| a.path().cmp(b.path()));
        segments.dedup_by(|a, b| a.path() == b.path());
        rejected.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            "Catalog scan of {}: {} segments, {} rejected",
            root.display(),
            segments.len(),
            rejected.len()
        );

        Ok(CatalogScan {
            root,
            segments,
            rejected,
        })
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.ignore_names.iter().any(|n| name == n.as_str())
    }
}

impl Default for SegmentCatalog {
    fn default() -> Self {
        Self::new(SegmentFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackRole;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"raw").unwrap();
    }

    #[test]
    fn missing_source_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = SegmentCatalog::default()
            .scan(&dir.path().join("not-mounted"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::SourceUnavailable { .. }));
    }

    #[test]
    fn file_source_is_rejected() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "REC_00_1.insv");
        let err = SegmentCatalog::default()
            .scan(&dir.path().join("REC_00_1.insv"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotADirectory(_)));
    }

    #[test]
    fn scans_recursively_and_sorts() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "DCIM/Camera02/REC002_00_001.insv");
        touch(dir.path(), "DCIM/Camera01/REC001_10_001.insv");
        touch(dir.path(), "DCIM/Camera01/REC001_00_001.insv");
        touch(dir.path(), "DCIM/Camera01/REC001_00_001.lrv");
        touch(dir.path(), "DCIM/notes.txt");

        let scan = SegmentCatalog::default().scan(dir.path()).unwrap();
        let names: Vec<String> = scan.segments.iter().map(|s| s.file_name()).collect();

        assert_eq!(
            names,
            vec!["REC001_00_001.insv", "REC001_10_001.insv", "REC002_00_001.insv"]
        );
        assert!(scan.segments.iter().all(|s| s.path().is_absolute()));
        assert_eq!(scan.segments[1].role(), TrackRole::Secondary);
        assert!(scan.segments[0].modified().is_some());
        assert!(scan.rejected.is_empty());
    }

    #[test]
    fn skips_hidden_entries() {
        let dir = tempdir().unwrap();
        touch(dir.path(), ".Trashes/REC_00_1.insv");
        touch(dir.path(), "._REC_00_2.insv");
        touch(dir.path(), "REC_00_3.insv");

        let scan = SegmentCatalog::default().scan(dir.path()).unwrap();
        assert_eq!(scan.segments.len(), 1);
        assert_eq!(scan.segments[0].file_name(), "REC_00_3.insv");
    }

    #[test]
    fn rejects_unmarked_names() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "REC_00_1.insv");
        touch(dir.path(), "SINGLE_1.insv");

        let scan = SegmentCatalog::default().scan(dir.path()).unwrap();
        assert_eq!(scan.segments.len(), 1);
        assert_eq!(scan.rejected.len(), 1);
        assert!(scan.rejected[0].reason.contains("SINGLE_1.insv"));
    }

    #[test]
    fn strict_mode_fails_on_unmarked_names() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "SINGLE_1.insv");

        let err = SegmentCatalog::default()
            .strict(true)
            .scan(dir.path())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnrecognizedSegment { .. }));
    }

    #[test]
    fn repeated_scans_are_identical() {
        let dir = tempdir().unwrap();
        for name in ["B_00_1.insv", "A_10_1.insv", "A_00_1.insv", "C_10_9.insv"] {
            touch(dir.path(), name);
        }

        let catalog = SegmentCatalog::default();
        let first = catalog.scan(dir.path()).unwrap();
        let second = catalog.scan(dir.path()).unwrap();
        assert_eq!(first.segments, second.segments);
    }
}
