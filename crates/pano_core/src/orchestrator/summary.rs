//! Run summary: per-unit outcomes for the operator.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::RejectedFile;
use crate::models::{StitchUnit, UnitOutcome};
use crate::pairing::PairingWarning;

/// File name of the JSON summary written next to the unit logs.
pub const SUMMARY_FILE: &str = "summary.json";

/// Outcome of one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub index: usize,
    pub label: String,
    pub base_name: String,
    pub members: Vec<PathBuf>,
    pub outcome: UnitOutcome,
    /// Local artifact (still on disk unless the outcome is `Done`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl UnitReport {
    /// Report for a unit that was never started.
    pub fn skipped(unit: &StitchUnit, reason: impl Into<String>) -> Self {
        Self {
            index: unit.index(),
            label: unit.label(),
            base_name: unit.base_name().to_string(),
            members: unit.members().iter().map(|m| m.path().to_path_buf()).collect(),
            outcome: UnitOutcome::Skipped,
            artifact: None,
            destination_key: None,
            error: Some(reason.into()),
            log_file: None,
        }
    }
}

/// Everything an operator needs after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Directory that was scanned.
    pub source: PathBuf,
    pub started_at: String,
    pub finished_at: String,
    /// Whether the run was cancelled before all units were attempted.
    pub cancelled: bool,
    /// One entry per unit, in unit order.
    pub units: Vec<UnitReport>,
    pub warnings: Vec<PairingWarning>,
    pub rejected: Vec<RejectedFile>,
}

impl RunSummary {
    /// Number of units with the given outcome.
    pub fn count(&self, outcome: UnitOutcome) -> usize {
        self.units.iter().filter(|u| u.outcome == outcome).count()
    }

    /// Local files kept because their upload did not complete.
    pub fn retained_files(&self) -> Vec<&Path> {
        self.units
            .iter()
            .filter(|u| u.outcome == UnitOutcome::Retained)
            .filter_map(|u| u.artifact.as_deref())
            .collect()
    }

    /// True when no unit failed or was retained.
    pub fn is_clean(&self) -> bool {
        self.count(UnitOutcome::Failed) == 0 && self.count(UnitOutcome::Retained) == 0
    }

    /// Write `summary.json` into `dir` (temp file + rename).
    pub fn write_json(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(SUMMARY_FILE);
        let temp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(path)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary for {}", self.source.display())?;
        for unit in &self.units {
            write!(f, "  {:<9} {}", unit.outcome.as_str().to_uppercase(), unit.label)?;
            if let Some(ref error) = unit.error {
                write!(f, ": {}", error)?;
            }
            writeln!(f)?;
        }

        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        for rejected in &self.rejected {
            writeln!(f, "  rejected: {} ({})", rejected.path.display(), rejected.reason)?;
        }

        write!(
            f,
            "{} done, {} retained, {} failed, {} skipped",
            self.count(UnitOutcome::Done),
            self.count(UnitOutcome::Retained),
            self.count(UnitOutcome::Failed),
            self.count(UnitOutcome::Skipped)
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }

        let retained = self.retained_files();
        if !retained.is_empty() {
            writeln!(f)?;
            write!(f, "Retained files needing attention:")?;
            for path in retained {
                write!(f, "\n  {}", path.display())?;
            }
        }
        Ok(())
    }
}
