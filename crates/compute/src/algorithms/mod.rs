//! Numeric building blocks used by the pipeline stages.
//!
//! - [`gbdt`]: histogram gradient-boosted regression trees
//! - [`idk`]: two-level isolation distributional kernel over sliding windows

pub mod gbdt;
pub mod idk;
