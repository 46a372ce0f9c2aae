//! Per-algorithm configuration.

pub mod options;

pub use options::*;
