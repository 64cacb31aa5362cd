//! Refresh scheduler runner.
//!
//! Split into focused submodules:
//! - `core`: RefreshScheduler struct, constructor, and accessors
//! - `execution`: one guarded refresh cycle and the timer loop

mod core;
mod execution;
#[cfg(test)]
mod tests;

pub use self::core::RefreshScheduler;
