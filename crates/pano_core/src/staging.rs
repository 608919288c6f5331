//! Staging: mirror raw segments from the device onto local disk.
//!
//! Files are copied to the same relative path under the staging folder, so
//! partner tracks stay side by side. A file already present with the same
//! size is left alone; copies go through a temporary name and are renamed
//! into place, so an interrupted copy is never mistaken for a segment.
//! Copies keep the device file's modification time, which artifact names
//! are derived from.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::models::SegmentFormat;
use crate::orchestrator::CancelHandle;

const TEMP_SUFFIX: &str = "staging";

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Device folder not available: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    #[error("Failed to stage {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Staging cancelled after {copied} files")]
    Cancelled { copied: usize },
}

/// What a staging pass did.
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    /// Files copied in this pass (destination paths).
    pub copied: Vec<PathBuf>,
    /// Files already present with the same size.
    pub already_present: usize,
    pub bytes_copied: u64,
}

/// Copy every raw segment under `source` into `staging_dir`.
///
/// Checks for cancellation between files; the file in flight is finished.
pub fn stage_segments(
    source: &Path,
    staging_dir: &Path,
    format: &SegmentFormat,
    cancel: &CancelHandle,
) -> Result<StagingReport, StagingError> {
    if !source.is_dir() {
        return Err(StagingError::SourceUnavailable {
            path: source.to_path_buf(),
        });
    }

    let mut report = StagingReport::default();

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry during staging: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file()
            || !format.has_extension(&entry.file_name().to_string_lossy())
        {
            continue;
        }

        if cancel.is_cancelled() {
            return Err(StagingError::Cancelled {
                copied: report.copied.len(),
            });
        }

        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = staging_dir.join(relative);
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        if fs::metadata(&dest).is_ok_and(|m| m.len() == size) {
            report.already_present += 1;
            continue;
        }

        tracing::info!("Copying {}", relative.display());
        copy_atomic(entry.path(), &dest).map_err(|source| StagingError::Copy {
            path: entry.path().to_path_buf(),
            source,
        })?;

        report.bytes_copied += size;
        report.copied.push(dest);
    }

    tracing::info!(
        "Staged {} files ({} bytes), {} already present",
        report.copied.len(),
        report.bytes_copied,
        report.already_present
    );

    Ok(report)
}

fn copy_atomic(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp = dest.as_os_str().to_owned();
    temp.push(".");
    temp.push(TEMP_SUFFIX);
    let temp = PathBuf::from(temp);

    if let Err(e) = copy_with_mtime(src, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    fs::rename(&temp, dest)
}

fn copy_with_mtime(src: &Path, dest: &Path) -> io::Result<()> {
    let modified = fs::metadata(src)?.modified()?;
    fs::copy(src, dest)?;
    File::options().write(true).open(dest)?.set_modified(modified)
}
