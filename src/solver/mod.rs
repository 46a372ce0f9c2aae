//! Iterative solver interfaces.

use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::ConvergenceHistory;
use num_traits::{Float, Zero};

/// Common interface for the linear-system engines.
///
/// `solve_in_place` treats `x` as the initial guess and overwrites it with
/// the final iterate; `solve` allocates `x = 0`. Both return the populated
/// [`ConvergenceHistory`]; running out of budget is not an error, so
/// callers must inspect `is_converged`.
pub trait IterativeSolver<M, V> {
    type Scalar: Float;

    /// Solve A·x = b, reading the initial guess from `x` and writing the
    /// final iterate back into it.
    fn solve_in_place(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<V>>,
        b: &V,
        x: &mut V,
    ) -> Result<ConvergenceHistory<Self::Scalar>, SolverError>;

    /// Solve A·x = b from the zero initial guess, allocating `x`.
    fn solve(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<V>>,
        b: &V,
    ) -> Result<(V, ConvergenceHistory<Self::Scalar>), SolverError>
    where
        V: From<Vec<Self::Scalar>> + AsRef<[Self::Scalar]>,
    {
        let n = b.as_ref().len();
        let mut x = V::from(vec![Self::Scalar::zero(); n]);
        let history = self.solve_in_place(a, pc, b, &mut x)?;
        Ok((x, history))
    }
}

pub mod cg;
pub use cg::{CgIteration, CgSolver, CgStateVariables};

pub mod bicgstabl;
pub use bicgstabl::{BiCgStabLIteration, BiCgStabLSolver};

pub mod idrs;
pub use idrs::{IdrsIteration, IdrsSolver};

pub mod stationary;
pub use stationary::{GaussSeidelSolver, JacobiSolver, SorSolver, SsorSolver, Sweep};

pub mod power;
pub use power::{PowerIteration, PowerSolver};
