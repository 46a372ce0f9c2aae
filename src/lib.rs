//! itersolve: iterative methods for linear systems and dominant eigenpairs
//!
//! This crate provides Krylov-subspace engines (CG/PCG, BiCGStab(l), IDR(s)),
//! the classical stationary sweeps (Jacobi, Gauss-Seidel, SOR, SSOR) and a
//! power/inverse-power eigeniteration, all built on a shared convergence
//! history and a resumable, iterator-based iteration-control contract.
//! Operators are abstract: anything implementing [`Apply`] can be solved
//! against, including non-materialized matrix-free operators.

pub mod config;
pub mod core;
pub mod error;
pub mod preconditioner;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use core::*;
pub use error::*;
pub use preconditioner::*;
pub use solver::*;
pub use utils::*;

// Re-export ConvergenceHistory at the crate root for convenience
pub use utils::convergence::ConvergenceHistory;
