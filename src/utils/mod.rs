//! Shared instrumentation for the iterative engines.

pub mod convergence;

pub use convergence::{Convergence, ConvergenceHistory};
