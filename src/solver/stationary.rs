//! Stationary sweeps: Jacobi, Gauss-Seidel, SOR and SSOR.
//!
//! These operate on an explicit matrix through [`EntryAccess`] — they need
//! individual entries, not just matvecs, so there is no operator-only
//! variant. The diagonal is scanned once up front; an exactly zero entry
//! fails with [`SolverError::SingularDiagonal`] naming the offending row,
//! before any sweep runs.
//!
//! The default contract runs exactly `sweeps` full sweeps with no early
//! exit. Setting `log` in [`StationaryOptions`] selects the alternate
//! entry behavior: the residual is recomputed after every sweep, recorded
//! in the history, and the run stops early once it meets the threshold.

use crate::config::options::StationaryOptions;
use crate::core::traits::EntryAccess;
use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::solver::IterativeSolver;
use crate::utils::convergence::{Convergence, ConvergenceHistory};
use bitflags::bitflags;
use num_traits::Float;

bitflags! {
    /// Sweep directions for the relaxed (SOR-type) update.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Sweep: u8 {
        const FORWARD  = 0b01;
        const BACKWARD = 0b10;
        const SYMMETRIC = Self::FORWARD.bits() | Self::BACKWARD.bits();
    }
}

#[derive(Copy, Clone)]
enum Kind {
    Jacobi,
    Relaxed { omega_is_advisory: bool, direction: Sweep },
}

/// Inverse diagonal, or the index of the first exactly-zero entry.
fn inv_diagonal<M, T>(a: &M) -> Result<Vec<T>, SolverError>
where
    M: EntryAccess<T>,
    T: Float,
{
    let n = a.nrows();
    let mut inv_diag = vec![T::zero(); n];
    for i in 0..n {
        let aii = a.entry(i, i);
        if aii == T::zero() {
            return Err(SolverError::SingularDiagonal(i));
        }
        inv_diag[i] = T::one() / aii;
    }
    Ok(inv_diag)
}

fn residual_norm<M, T>(a: &M, b: &[T], x: &[T]) -> T
where
    M: EntryAccess<T>,
    T: Float,
{
    let n = b.len();
    let mut acc = T::zero();
    for i in 0..n {
        let mut ri = b[i];
        for j in 0..n {
            ri = ri - a.entry(i, j) * x[j];
        }
        acc = acc + ri * ri;
    }
    acc.sqrt()
}

/// One Jacobi sweep: every component computed from the old iterate.
fn jacobi_sweep<M, T>(a: &M, b: &[T], x: &mut [T], next: &mut [T], inv_diag: &[T])
where
    M: EntryAccess<T>,
    T: Float,
{
    let n = b.len();
    for i in 0..n {
        let mut sigma = b[i];
        for j in 0..n {
            if j != i {
                sigma = sigma - a.entry(i, j) * x[j];
            }
        }
        next[i] = sigma * inv_diag[i];
    }
    x.copy_from_slice(next);
}

/// Relaxed in-place sweep: already-updated components are used within the
/// same sweep, and the Gauss-Seidel value is blended with the previous one
/// through ω. ω = 1 and `FORWARD` is plain Gauss-Seidel.
fn relaxed_sweep<M, T>(a: &M, b: &[T], x: &mut [T], inv_diag: &[T], omega: T, direction: Sweep)
where
    M: EntryAccess<T>,
    T: Float,
{
    let n = b.len();
    if direction.intersects(Sweep::FORWARD) {
        for i in 0..n {
            let mut sigma = b[i];
            for j in 0..n {
                if j != i {
                    sigma = sigma - a.entry(i, j) * x[j];
                }
            }
            let gs = sigma * inv_diag[i];
            x[i] = x[i] + omega * (gs - x[i]);
        }
    }
    if direction.intersects(Sweep::BACKWARD) {
        for i in (0..n).rev() {
            let mut sigma = b[i];
            for j in 0..n {
                if j != i {
                    sigma = sigma - a.entry(i, j) * x[j];
                }
            }
            let gs = sigma * inv_diag[i];
            x[i] = x[i] + omega * (gs - x[i]);
        }
    }
}

fn run_sweeps<M, T>(
    kind: Kind,
    a: &M,
    b: &[T],
    x: &mut [T],
    omega: T,
    opts: &StationaryOptions<T>,
) -> Result<ConvergenceHistory<T>, SolverError>
where
    M: EntryAccess<T>,
    T: Float + From<f64>,
{
    let n = b.len();
    assert_eq!(a.nrows(), n, "matrix and right-hand side dimensions differ");
    assert_eq!(x.len(), n, "iterate has incorrect length");
    let inv_diag = inv_diagonal(a)?;
    if let Kind::Relaxed { omega_is_advisory: true, .. } = kind {
        let two: T = 2.0f64.into();
        if omega <= T::zero() || omega >= two {
            log::warn!(
                "relaxation parameter {} outside the provable-convergence range (0, 2)",
                omega.to_f64().unwrap_or(f64::NAN)
            );
        }
    }
    let b_norm = b.iter().fold(T::zero(), |acc, bi| acc + *bi * *bi).sqrt();
    let conv = Convergence::new(opts.abstol, opts.reltol, b_norm, opts.sweeps);
    let mut history = ConvergenceHistory::new(conv.threshold);
    if opts.log {
        history.reserve(opts.sweeps);
    }
    let mut next = vec![T::zero(); if matches!(kind, Kind::Jacobi) { n } else { 0 }];
    for _ in 0..opts.sweeps {
        match kind {
            Kind::Jacobi => jacobi_sweep(a, b, x, &mut next, &inv_diag),
            Kind::Relaxed { direction, .. } => relaxed_sweep(a, b, x, &inv_diag, omega, direction),
        }
        if opts.log {
            let res = residual_norm(a, b, x);
            history.push_residual(res, true);
            if conv.met(res) {
                break;
            }
        } else {
            history.iters += 1;
        }
    }
    let final_res = match history.last_residual() {
        Some(res) => res,
        None => residual_norm(a, b, x),
    };
    history.set_converged(conv.met(final_res));
    history.shrink_to_fit();
    Ok(history)
}

macro_rules! stationary_solver {
    ($name:ident, $doc:literal, $kind:expr) => {
        #[doc = $doc]
        pub struct $name<T> {
            pub opts: StationaryOptions<T>,
            pub omega: T,
        }

        impl<T: Float> $name<T> {
            pub fn new(opts: StationaryOptions<T>, omega: T) -> Self {
                Self { opts, omega }
            }
        }

        impl<M, V, T> IterativeSolver<M, V> for $name<T>
        where
            M: EntryAccess<T>,
            V: AsRef<[T]> + AsMut<[T]> + From<Vec<T>> + Clone,
            T: Float + From<f64>,
        {
            type Scalar = T;

            fn solve_in_place(
                &mut self,
                a: &M,
                pc: Option<&dyn Preconditioner<V>>,
                b: &V,
                x: &mut V,
            ) -> Result<ConvergenceHistory<T>, SolverError> {
                let _ = pc; // stationary sweeps use the diagonal directly
                run_sweeps($kind, a, b.as_ref(), x.as_mut(), self.omega, &self.opts)
            }
        }
    };
}

/// Jacobi sweeps: x_new[i] = (b[i] − Σ_{j≠i} A[i,j] x_old[j]) / A[i,i].
pub struct JacobiSolver<T> {
    pub opts: StationaryOptions<T>,
}

impl<T: Float> JacobiSolver<T> {
    pub fn new(opts: StationaryOptions<T>) -> Self {
        Self { opts }
    }
}

impl<M, V, T> IterativeSolver<M, V> for JacobiSolver<T>
where
    M: EntryAccess<T>,
    V: AsRef<[T]> + AsMut<[T]> + From<Vec<T>> + Clone,
    T: Float + From<f64>,
{
    type Scalar = T;

    fn solve_in_place(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<V>>,
        b: &V,
        x: &mut V,
    ) -> Result<ConvergenceHistory<T>, SolverError> {
        let _ = pc;
        run_sweeps(Kind::Jacobi, a, b.as_ref(), x.as_mut(), T::one(), &self.opts)
    }
}

/// Gauss-Seidel sweeps: in-place, each row uses components already updated
/// within the sweep.
pub struct GaussSeidelSolver<T> {
    pub opts: StationaryOptions<T>,
}

impl<T: Float> GaussSeidelSolver<T> {
    pub fn new(opts: StationaryOptions<T>) -> Self {
        Self { opts }
    }
}

impl<M, V, T> IterativeSolver<M, V> for GaussSeidelSolver<T>
where
    M: EntryAccess<T>,
    V: AsRef<[T]> + AsMut<[T]> + From<Vec<T>> + Clone,
    T: Float + From<f64>,
{
    type Scalar = T;

    fn solve_in_place(
        &mut self,
        a: &M,
        pc: Option<&dyn Preconditioner<V>>,
        b: &V,
        x: &mut V,
    ) -> Result<ConvergenceHistory<T>, SolverError> {
        let _ = pc;
        run_sweeps(
            Kind::Relaxed { omega_is_advisory: false, direction: Sweep::FORWARD },
            a,
            b.as_ref(),
            x.as_mut(),
            T::one(),
            &self.opts,
        )
    }
}

stationary_solver!(
    SorSolver,
    "Successive over-relaxation: forward Gauss-Seidel blended with the \
     previous iterate through ω. An ω outside (0, 2) is accepted with a \
     warning; convergence is then not guaranteed.",
    Kind::Relaxed { omega_is_advisory: true, direction: Sweep::FORWARD }
);

stationary_solver!(
    SsorSolver,
    "Symmetric SOR: one forward then one backward relaxed sweep per \
     iteration, the backward half reusing the values from the forward \
     half.",
    Kind::Relaxed { omega_is_advisory: true, direction: Sweep::SYMMETRIC }
);
