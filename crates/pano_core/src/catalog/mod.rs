//! Segment catalog: discovery and classification of raw segment files.
//!
//! The catalog walks a source tree (a mounted camera or a local staging
//! copy), keeps files with the raw-segment extension, and parses each name
//! into a [`RawSegment`](crate::models::RawSegment). Output is sorted by path
//! and free of duplicates, so the same tree always yields the same list.

mod scanner;

pub use scanner::{CatalogError, CatalogResult, CatalogScan, RejectedFile, SegmentCatalog};
