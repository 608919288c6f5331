//! Deterministic names for stitched artifacts and their upload keys.
//!
//! The local file name and the remote key are derived from the same inputs
//! (recording base-name + earliest member timestamp), so a retained file can
//! always be matched with its remote copy and a re-run against the same
//! segments produces the same name.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::models::StitchUnit;

/// Timestamp format embedded in artifact names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suffix of in-progress stitch outputs.
pub const PARTIAL_SUFFIX: &str = "part";

/// Artifact file name for a unit: `{base}_{YYYYMMDD_HHMMSS}.{ext}`.
///
/// Falls back to `{base}.{ext}` when no member has a modification time.
pub fn artifact_file_name(unit: &StitchUnit, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    match unit.earliest_modified() {
        Some(ts) => format!(
            "{}_{}.{}",
            unit.base_name(),
            ts.format(TIMESTAMP_FORMAT),
            extension
        ),
        None => format!("{}.{}", unit.base_name(), extension),
    }
}

/// Artifact names for every unit of a run, in unit order.
///
/// Units whose names would collide (same base-name from different folders
/// recorded in the same second) get their 1-based unit index appended:
/// `{base}_{YYYYMMDD_HHMMSS}_{NNN}.{ext}`. Units with a unique name keep it.
pub fn plan_artifact_names(units: &[StitchUnit], extension: &str) -> Vec<String> {
    let natural: Vec<String> = units
        .iter()
        .map(|unit| artifact_file_name(unit, extension))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &natural {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    units
        .iter()
        .zip(&natural)
        .map(|(unit, name)| {
            if counts[name.as_str()] > 1 {
                disambiguate(name, unit.index() + 1)
            } else {
                name.clone()
            }
        })
        .collect()
}

/// First name that appears more than once, if any.
pub fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

fn disambiguate(name: &str, ordinal: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{:03}.{}", stem, ordinal, ext),
        None => format!("{}_{:03}", name, ordinal),
    }
}

/// Path the stitcher writes to before the output is confirmed complete.
///
/// The marker goes before the extension (`x.part.mp4`) since the stitcher
/// picks its container from the extension.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match final_path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, PARTIAL_SUFFIX, ext.to_string_lossy()),
        None => format!("{}.{}", stem, PARTIAL_SUFFIX),
    };
    final_path.with_file_name(name)
}

/// Remote key for an artifact: the prefix used verbatim, then the file name.
pub fn destination_key(prefix: &str, file_name: &str) -> String {
    format!("{}{}", prefix, file_name)
}
