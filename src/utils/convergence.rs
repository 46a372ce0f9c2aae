//! Convergence tracking & tolerance checks for iterative solvers.

use num_traits::Float;

/// Stopping criteria resolved once at solve entry: the run stops when the
/// residual norm falls to `threshold = max(abstol, reltol·‖b‖)` or the
/// budget is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct Convergence<T> {
    pub threshold: T,
    pub budget: usize,
}

impl<T: Float> Convergence<T> {
    /// Resolve the threshold from absolute/relative tolerances and ‖b‖.
    pub fn new(abstol: T, reltol: T, b_norm: T, budget: usize) -> Self {
        Self { threshold: abstol.max(reltol * b_norm), budget }
    }

    /// Whether `res_norm` meets the threshold.
    pub fn met(&self, res_norm: T) -> bool {
        res_norm <= self.threshold
    }
}

/// Record of one solve: iteration count, matvec count, convergence flag,
/// tolerance and the residual-norm trace.
///
/// Pure bookkeeping: engines write it through the narrow push interface
/// below and never read it back for control decisions. The trace is
/// append-only; drivers `reserve` it up front and `shrink_to_fit` once the
/// run ends.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceHistory<T> {
    pub is_converged: bool,
    pub tolerance: T,
    pub mv_products: usize,
    pub iters: usize,
    residuals: Vec<T>,
}

impl<T: Float> ConvergenceHistory<T> {
    pub fn new(tolerance: T) -> Self {
        Self {
            is_converged: false,
            tolerance,
            mv_products: 0,
            iters: 0,
            residuals: Vec::new(),
        }
    }

    /// Pre-size the residual trace for `n` iterations.
    pub fn reserve(&mut self, n: usize) {
        self.residuals.reserve(n);
    }

    /// Count an executed iteration, recording its residual norm when
    /// `trace` is set.
    pub fn push_residual(&mut self, res_norm: T, trace: bool) {
        self.iters += 1;
        if trace {
            self.residuals.push(res_norm);
        }
    }

    pub fn add_mv_products(&mut self, count: usize) {
        self.mv_products += count;
    }

    pub fn set_converged(&mut self, converged: bool) {
        self.is_converged = converged;
    }

    /// Trim the trace down to its actual length.
    pub fn shrink_to_fit(&mut self) {
        self.residuals.shrink_to_fit();
    }

    /// The recorded residual norms, one per iteration (empty when tracing
    /// was disabled).
    pub fn residuals(&self) -> &[T] {
        &self.residuals
    }

    pub fn last_residual(&self) -> Option<T> {
        self.residuals.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_max_of_abs_and_rel() {
        let conv = Convergence::new(1e-8, 1e-6, 100.0, 50);
        approx::assert_abs_diff_eq!(conv.threshold, 1e-4, epsilon = 1e-12);
        assert!(conv.met(9.9e-5));
        assert!(!conv.met(1.1e-4));
    }

    #[test]
    fn history_counts_iterations_and_traces() {
        let mut h = ConvergenceHistory::new(1e-10_f64);
        h.reserve(4);
        h.push_residual(1.0, true);
        h.push_residual(0.5, true);
        h.push_residual(0.25, false);
        assert_eq!(h.iters, 3);
        assert_eq!(h.residuals(), &[1.0, 0.5]);
        assert_eq!(h.last_residual(), Some(0.5));
    }
}
