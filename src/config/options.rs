//! Option structs for the iterative engines.
//!
//! One explicit struct per algorithm, every recognized option enumerated
//! with its default. Options are resolved exactly once at the call
//! boundary; nothing is recomputed mid-run. `None` for an iteration budget
//! means "derive from the problem size" via the default-policy helpers at
//! the bottom of this module.

use num_traits::Float;

/// Stopping thresholds shared by the Krylov engines: the run stops when
/// ‖r‖ ≤ max(abstol, reltol·‖b‖).
#[derive(Debug, Clone, Copy)]
pub struct CgOptions<T> {
    /// Absolute residual tolerance.
    pub abstol: T,
    /// Residual tolerance relative to ‖b‖.
    pub reltol: T,
    /// Iteration budget; `None` derives n from the right-hand side.
    pub max_iters: Option<usize>,
    /// Caller guarantees x0 = 0, so the first matvec can be skipped.
    pub initially_zero: bool,
    /// Record the per-iteration residual trace in the history.
    pub log: bool,
    /// Emit per-iteration progress via `log::debug!`.
    pub verbose: bool,
}

impl<T: Float> Default for CgOptions<T> {
    fn default() -> Self {
        Self {
            abstol: T::zero(),
            reltol: default_reltol(),
            max_iters: None,
            initially_zero: false,
            log: true,
            verbose: false,
        }
    }
}

/// Strategy for the per-cycle polynomial coefficients of BiCGStab(l).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolynomialMode {
    /// Minimize the residual of the full block (normal equations on the
    /// Gram matrix).
    MinimalResidual,
    /// Sleijpen–van der Vorst maintaining-convergence blend of the minimal
    /// residual and orthogonal polynomials (κ = 0.7).
    ConvexCombination,
}

#[derive(Debug, Clone, Copy)]
pub struct BiCgStabLOptions<T> {
    /// Number of Bi-CG steps per outer cycle.
    pub l: usize,
    pub abstol: T,
    pub reltol: T,
    /// Budget on matrix-vector products, not outer cycles; each cycle
    /// consumes 2l products. `None` derives 4n.
    pub max_mv_products: Option<usize>,
    pub polynomial: PolynomialMode,
    /// Seed for the random shadow vector; fixed seed gives bit-for-bit
    /// reproducible runs.
    pub seed: Option<u64>,
    pub initially_zero: bool,
    pub log: bool,
    pub verbose: bool,
}

impl<T: Float> Default for BiCgStabLOptions<T> {
    fn default() -> Self {
        Self {
            l: 2,
            abstol: T::zero(),
            reltol: default_reltol(),
            max_mv_products: None,
            polynomial: PolynomialMode::MinimalResidual,
            seed: None,
            initially_zero: false,
            log: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdrsOptions<T> {
    /// Dimension of the shadow space.
    pub s: usize,
    pub abstol: T,
    pub reltol: T,
    /// Budget counted at per-matvec granularity (inner steps and omega
    /// steps each cost one). `None` derives n.
    pub max_iters: Option<usize>,
    /// Seed for the random projection basis P, sampled once per solve.
    pub seed: Option<u64>,
    pub log: bool,
    pub verbose: bool,
}

impl<T: Float> Default for IdrsOptions<T> {
    fn default() -> Self {
        Self {
            s: 8,
            abstol: T::zero(),
            reltol: default_reltol(),
            max_iters: None,
            seed: None,
            log: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StationaryOptions<T> {
    /// Number of full sweeps to run.
    pub sweeps: usize,
    pub abstol: T,
    pub reltol: T,
    /// With `log` set the residual is checked after every sweep and the run
    /// may stop early; otherwise exactly `sweeps` sweeps run with no
    /// early exit.
    pub log: bool,
}

impl<T: Float> Default for StationaryOptions<T> {
    fn default() -> Self {
        Self {
            sweeps: 10,
            abstol: T::zero(),
            reltol: default_reltol(),
            log: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PowerOptions<T> {
    /// Eigenresidual tolerance ‖Ax − θx‖; `None` derives n³·ε.
    pub tol: Option<T>,
    /// Iteration budget; `None` derives n.
    pub max_iters: Option<usize>,
    /// Spectral shift σ; the reported eigenvalue is σ + θ (or σ + 1/θ in
    /// inverse mode).
    pub shift: T,
    /// The supplied operator represents (A − σI)⁻¹.
    pub inverse: bool,
    pub log: bool,
    pub verbose: bool,
}

impl<T: Float> Default for PowerOptions<T> {
    fn default() -> Self {
        Self {
            tol: None,
            max_iters: None,
            shift: T::zero(),
            inverse: false,
            log: true,
            verbose: false,
        }
    }
}

/// Default relative tolerance for the Krylov engines: √ε.
pub fn default_reltol<T: Float>() -> T {
    T::epsilon().sqrt()
}

/// Default eigenresidual tolerance for the power iteration: n³·ε.
pub fn default_power_tolerance<T: Float>(n: usize) -> T {
    let nf = T::from(n).unwrap_or_else(T::one);
    nf * nf * nf * T::epsilon()
}

/// Default iteration budget shared by CG, IDR(s) and the power iteration.
pub fn default_max_iters(n: usize) -> usize {
    n
}

/// Default matvec budget for BiCGStab(l).
pub fn default_max_mv_products(n: usize) -> usize {
    4 * n
}
