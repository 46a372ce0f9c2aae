use thiserror::Error;

// Unified error type for itersolve.
//
// Non-convergence is deliberately absent: running out of iterations or
// matrix-vector products is a normal terminal state recorded in the
// convergence history, never an error.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("singular diagonal at row {0}")]
    SingularDiagonal(usize),
    #[error("matrix is not positive semidefinite (u^T A u <= 0)")]
    NotPositiveSemidefinite,
    #[error("subspace breakdown: {0}")]
    Breakdown(&'static str),
}
