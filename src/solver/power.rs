//! Power iteration for the dominant eigenpair, with a shifted-inverse mode.
//!
//! Maintains a unit-norm eigenvector estimate x, the Rayleigh quotient
//! θ = ⟨x, Ax⟩ and the eigenresidual ‖Ax − θx‖. For interior eigenvalues
//! the caller supplies an operator representing (A − σI)⁻¹ (built
//! externally, e.g. as an [`FnOperator`](crate::core::FnOperator) over a
//! factorization) and the reported eigenvalue is transformed back as
//! σ + 1/θ.

use crate::config::options::{PowerOptions, default_max_iters, default_power_tolerance};
use crate::core::traits::{Apply, InnerProduct};
use crate::error::SolverError;
use crate::utils::convergence::{Convergence, ConvergenceHistory};
use num_traits::Float;

/// Resumable power-iteration state machine. Each `next()` applies the
/// operator once and yields the eigenresidual norm ‖Ax − θx‖.
pub struct PowerIteration<'a, M, T> {
    a: &'a M,
    x: &'a mut Vec<T>,
    y: Vec<T>,
    theta: T,
    residual: T,
    conv: Convergence<T>,
    iter: usize,
    verbose: bool,
}

impl<'a, M, T> PowerIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    /// Build the initial state from a nonzero starting vector, which is
    /// normalized here regardless of the caller's contract.
    pub fn new(a: &'a M, x: &'a mut Vec<T>, conv: Convergence<T>, verbose: bool) -> Result<Self, SolverError> {
        let ip = ();
        let nx = ip.norm(x);
        if nx == T::zero() {
            return Err(SolverError::Breakdown("zero initial eigenvector estimate"));
        }
        for xj in x.iter_mut() {
            *xj = *xj / nx;
        }
        let n = x.len();
        Ok(Self {
            a,
            x,
            y: vec![T::zero(); n],
            theta: T::zero(),
            residual: T::infinity(),
            conv,
            iter: 0,
            verbose,
        })
    }

    /// Current Rayleigh quotient ⟨x, Ax⟩.
    pub fn theta(&self) -> T {
        self.theta
    }

    pub fn residual(&self) -> T {
        self.residual
    }

    pub fn converged(&self) -> bool {
        self.conv.met(self.residual)
    }

    fn done(&self) -> bool {
        self.conv.met(self.residual) || self.iter >= self.conv.budget
    }
}

impl<'a, M, T> Iterator for PowerIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done() {
            return None;
        }
        let ip = ();
        self.a.apply(self.x, &mut self.y);
        self.theta = ip.dot(self.x, &self.y);
        // ‖Ax − θx‖ with x still unit-norm
        let mut acc = T::zero();
        for (yj, xj) in self.y.iter().zip(self.x.iter()) {
            let rj = *yj - self.theta * *xj;
            acc = acc + rj * rj;
        }
        self.residual = acc.sqrt();
        let ny = ip.norm(&self.y);
        for (xj, yj) in self.x.iter_mut().zip(self.y.iter()) {
            *xj = *yj / ny;
        }
        self.iter += 1;
        if self.verbose {
            log::debug!(
                "powm: iter {} residual {:.3e}",
                self.iter,
                self.residual.to_f64().unwrap_or(f64::NAN)
            );
        }
        Some(self.residual)
    }
}

/// Power-iteration driver. Returns the estimated eigenvalue (transformed
/// back through the shift in inverse mode), the unit-norm eigenvector and
/// the history.
pub struct PowerSolver<T> {
    pub opts: PowerOptions<T>,
}

impl<T: Float + From<f64>> PowerSolver<T> {
    pub fn new(opts: PowerOptions<T>) -> Self {
        Self { opts }
    }

    pub fn solve<M, V>(&mut self, a: &M, x0: &V) -> Result<(T, V, ConvergenceHistory<T>), SolverError>
    where
        M: Apply<Vec<T>>,
        (): InnerProduct<Vec<T>, Scalar = T>,
        V: AsRef<[T]> + From<Vec<T>> + Clone,
    {
        let n = x0.as_ref().len();
        let tol = self.opts.tol.unwrap_or_else(|| default_power_tolerance(n));
        let budget = self.opts.max_iters.unwrap_or_else(|| default_max_iters(n));
        let conv = Convergence { threshold: tol, budget };
        let mut history = ConvergenceHistory::new(tol);
        if self.opts.log {
            history.reserve(budget);
        }
        let mut x_vec = x0.as_ref().to_vec();
        let mut iteration = PowerIteration::new(a, &mut x_vec, conv, self.opts.verbose)?;
        while let Some(res_norm) = iteration.next() {
            history.add_mv_products(1);
            history.push_residual(res_norm, self.opts.log);
        }
        history.set_converged(iteration.converged());
        let theta = iteration.theta();
        drop(iteration);
        history.shrink_to_fit();
        let lambda = if self.opts.inverse {
            self.opts.shift + T::one() / theta
        } else {
            self.opts.shift + theta
        };
        Ok((lambda, V::from(x_vec), history))
    }
}
