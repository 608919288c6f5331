//! Pair resolver: groups raw segments into stitch units.

mod resolver;

pub use resolver::{resolve_pairs, PairingWarning, Resolution};
