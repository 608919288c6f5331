//! Pano Core - Backend logic for pano-ingest
//!
//! This crate contains the ingest pipeline for dual-fisheye camera footage:
//! segment discovery, lens-track pairing, and the stitch → upload → cleanup
//! sequence driven through external tools. It has no CLI dependencies and
//! can be embedded in other front ends.

pub mod capability;
pub mod catalog;
pub mod config;
pub mod device;
pub mod logging;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod pairing;
pub mod staging;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
