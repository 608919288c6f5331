//! Deterministic grouping of lens tracks into stitch units.
//!
//! Segments are visited in path order. A primary claims the secondary at
//! its partner path; the first primary (in path order) to claim a partner
//! wins. Every segment ends up in exactly one unit.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::models::{RawSegment, StitchUnit, TrackRole};

/// Non-fatal pairing problems.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PairingWarning {
    /// Two primaries resolved to the same partner; `segment` was left unpaired.
    #[error("Ambiguous pairing: {segment} wants {partner}, already paired with {claimed_by}")]
    AmbiguousPairing {
        segment: PathBuf,
        partner: PathBuf,
        claimed_by: PathBuf,
    },
}

/// Stitch units plus the warnings raised while building them.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub units: Vec<StitchUnit>,
    pub warnings: Vec<PairingWarning>,
}

impl Resolution {
    /// Number of two-member units.
    pub fn paired_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_paired()).count()
    }

    /// Number of single-member units.
    pub fn unpaired_count(&self) -> usize {
        self.units.len() - self.paired_count()
    }
}

/// Group segments into stitch units.
///
/// Input order does not matter; duplicate paths are collapsed.
pub fn resolve_pairs(segments: &[RawSegment]) -> Resolution {
    let mut sorted: Vec<&RawSegment> = segments.iter().collect();
    sorted.sort_by(|a, b| a.path().cmp(b.path()));
    sorted.dedup_by(|a, b| a.path() == b.path());

    let by_path: HashMap<&Path, &RawSegment> = sorted.iter().map(|&s| (s.path(), s)).collect();

    // Secondary path -> first primary (in path order) that references it.
    let mut claims: HashMap<&Path, &Path> = HashMap::new();
    for seg in sorted.iter().copied().filter(|s| s.is_primary()) {
        if let Some(partner) = secondary_at(&by_path, seg.partner_path()) {
            claims.entry(partner.path()).or_insert(seg.path());
        }
    }

    let mut assigned: HashSet<&Path> = HashSet::new();
    let mut resolution = Resolution::default();

    for seg in sorted.iter().copied() {
        if assigned.contains(seg.path()) {
            continue;
        }
        let index = resolution.units.len();

        match seg.role() {
            TrackRole::Primary => match secondary_at(&by_path, seg.partner_path()) {
                Some(partner)
                    if claims.get(partner.path()) == Some(&seg.path())
                        && !assigned.contains(partner.path()) =>
                {
                    assigned.insert(seg.path());
                    assigned.insert(partner.path());
                    resolution
                        .units
                        .push(StitchUnit::pair(index, seg.clone(), partner.clone()));
                }
                Some(partner) => {
                    let claimed_by = claims
                        .get(partner.path())
                        .map(|p| p.to_path_buf())
                        .unwrap_or_default();
                    let warning = PairingWarning::AmbiguousPairing {
                        segment: seg.path().to_path_buf(),
                        partner: partner.path().to_path_buf(),
                        claimed_by,
                    };
                    tracing::warn!("{}", warning);
                    resolution.warnings.push(warning);

                    assigned.insert(seg.path());
                    resolution.units.push(StitchUnit::single(index, seg.clone()));
                }
                None => {
                    assigned.insert(seg.path());
                    resolution.units.push(StitchUnit::single(index, seg.clone()));
                }
            },
            TrackRole::Secondary => {
                // Its primary comes later and will take it.
                if claims.contains_key(seg.path()) {
                    continue;
                }
                assigned.insert(seg.path());
                resolution.units.push(StitchUnit::single(index, seg.clone()));
            }
        }
    }

    tracing::debug!(
        "Resolved {} units ({} paired, {} single)",
        resolution.units.len(),
        resolution.paired_count(),
        resolution.unpaired_count()
    );

    resolution
}

fn secondary_at<'a>(by_path: &HashMap<&Path, &'a RawSegment>, path: &Path) -> Option<&'a RawSegment> {
    by_path
        .get(path)
        .copied()
        .filter(|s| s.role() == TrackRole::Secondary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentFormat;

    fn seg(path: &str) -> RawSegment {
        RawSegment::parse(path, &SegmentFormat::default(), None).unwrap()
    }

    fn names(unit: &StitchUnit) -> Vec<String> {
        unit.members().iter().map(|m| m.file_name()).collect()
    }

    #[test]
    fn pairs_primary_with_secondary() {
        let res = resolve_pairs(&[seg("/s/A_00_x.insv"), seg("/s/A_10_x.insv")]);
        assert_eq!(res.units.len(), 1);
        assert_eq!(names(&res.units[0]), vec!["A_00_x.insv", "A_10_x.insv"]);
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn lone_primary_is_singleton() {
        let res = resolve_pairs(&[seg("/s/A_00_x.insv")]);
        assert_eq!(res.units.len(), 1);
        assert!(!res.units[0].is_paired());
    }

    #[test]
    fn lone_secondary_is_not_dropped() {
        let res = resolve_pairs(&[seg("/s/B_10_x.insv"), seg("/s/A_00_x.insv")]);
        assert_eq!(res.units.len(), 2);
        assert_eq!(names(&res.units[0]), vec!["A_00_x.insv"]);
        assert_eq!(names(&res.units[1]), vec!["B_10_x.insv"]);
    }

    #[test]
    fn reference_example() {
        let res = resolve_pairs(&[
            seg("/s/REC001_00_001.insv"),
            seg("/s/REC001_10_001.insv"),
            seg("/s/REC002_00_001.insv"),
        ]);

        assert_eq!(res.units.len(), 2);
        assert_eq!(
            names(&res.units[0]),
            vec!["REC001_00_001.insv", "REC001_10_001.insv"]
        );
        assert_eq!(names(&res.units[1]), vec!["REC002_00_001.insv"]);
        assert_eq!(res.units[0].index(), 0);
        assert_eq!(res.units[1].index(), 1);
    }

    #[test]
    fn partner_in_other_directory_does_not_pair() {
        let res = resolve_pairs(&[seg("/a/R_00_1.insv"), seg("/b/R_10_1.insv")]);
        assert_eq!(res.units.len(), 2);
        assert!(res.units.iter().all(|u| !u.is_paired()));
    }

    #[test]
    fn secondary_sorting_first_still_pairs() {
        // Custom markers where the secondary sorts before its primary.
        let format = SegmentFormat::new("_B_", "_A_", "insv");
        let primary = RawSegment::parse("/s/R_B_1.insv", &format, None).unwrap();
        let secondary = RawSegment::parse("/s/R_A_1.insv", &format, None).unwrap();

        let res = resolve_pairs(&[primary, secondary]);
        assert_eq!(res.units.len(), 1);
        assert_eq!(names(&res.units[0]), vec!["R_B_1.insv", "R_A_1.insv"]);
    }

    #[test]
    fn ambiguous_partner_goes_to_first_primary() {
        let secondary = seg("/s/R_10_1.insv");
        let first = RawSegment::new("/s/R_00_1.insv", "R_1", TrackRole::Primary, "/s/R_10_1.insv", None);
        let second = RawSegment::new("/s/R_00_1b.insv", "R_1", TrackRole::Primary, "/s/R_10_1.insv", None);

        let res = resolve_pairs(&[second, secondary, first]);

        assert_eq!(res.units.len(), 2);
        assert_eq!(names(&res.units[0]), vec!["R_00_1.insv", "R_10_1.insv"]);
        assert_eq!(names(&res.units[1]), vec!["R_00_1b.insv"]);
        assert_eq!(res.warnings.len(), 1);
        let PairingWarning::AmbiguousPairing { segment, claimed_by, .. } = &res.warnings[0];
        assert_eq!(segment, Path::new("/s/R_00_1b.insv"));
        assert_eq!(claimed_by, Path::new("/s/R_00_1.insv"));
    }

    #[test]
    fn every_segment_in_exactly_one_unit() {
        let input: Vec<RawSegment> = [
            "/s/A_00_1.insv",
            "/s/A_10_1.insv",
            "/s/B_00_1.insv",
            "/s/C_10_1.insv",
            "/s/D_00_2.insv",
            "/s/D_10_2.insv",
            "/s/D_10_3.insv",
            "/s/D_00_1.insv",
        ]
        .iter()
        .map(|p| seg(p))
        .collect();

        let res = resolve_pairs(&input);
        let mut seen: Vec<&Path> = res
            .units
            .iter()
            .flat_map(|u| u.members().iter().map(|m| m.path()))
            .collect();
        seen.sort();
        let before = seen.len();
        seen.dedup();

        assert_eq!(before, input.len());
        assert_eq!(seen.len(), input.len());
        assert_eq!(res.paired_count(), 2);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let forward: Vec<RawSegment> = ["/s/A_00_1.insv", "/s/A_10_1.insv", "/s/B_00_1.insv", "/s/C_10_1.insv"]
            .iter()
            .map(|p| seg(p))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(resolve_pairs(&forward).units, resolve_pairs(&reversed).units);
    }

    #[test]
    fn duplicate_paths_collapse() {
        let res = resolve_pairs(&[seg("/s/A_00_1.insv"), seg("/s/A_00_1.insv")]);
        assert_eq!(res.units.len(), 1);
    }
}
