//! Conjugate Gradient, plain and left-preconditioned (Saad §6.7, §9.2).
//!
//! Requires A symmetric positive definite. This is a documented
//! precondition, not a runtime check; an indefinite A is only caught when
//! the recurrence happens to produce ⟨u, Au⟩ ≤ 0.

use crate::config::options::{CgOptions, default_max_iters};
use crate::core::traits::{Apply, InnerProduct};
use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::solver::IterativeSolver;
use crate::utils::convergence::{Convergence, ConvergenceHistory};
use num_traits::Float;
use std::cell::RefCell;

/// Caller-owned buffer bundle for allocation-free repeated solves with the
/// same dimensions: residual `r`, scratch `c` (preconditioned residual,
/// then A·u) and search direction `u`.
#[derive(Debug, Clone)]
pub struct CgStateVariables<T> {
    pub r: Vec<T>,
    pub c: Vec<T>,
    pub u: Vec<T>,
}

impl<T: Float> CgStateVariables<T> {
    pub fn zeros(n: usize) -> Self {
        Self { r: vec![T::zero(); n], c: vec![T::zero(); n], u: vec![T::zero(); n] }
    }

    fn resize(&mut self, n: usize) {
        self.r.clear();
        self.r.resize(n, T::zero());
        self.c.clear();
        self.c.resize(n, T::zero());
        self.u.clear();
        self.u.resize(n, T::zero());
    }
}

/// Resumable CG/PCG state machine. Each `next()` advances one iteration and
/// yields the unpreconditioned residual norm ‖b − A xₖ‖; restart by
/// reconstruction.
pub struct CgIteration<'a, M, T> {
    a: &'a M,
    pc: Option<&'a dyn Preconditioner<Vec<T>>>,
    x: &'a mut Vec<T>,
    state: &'a mut CgStateVariables<T>,
    rho: T,
    residual: T,
    conv: Convergence<T>,
    iter: usize,
    failed: bool,
    verbose: bool,
}

impl<'a, M, T> CgIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    /// Build the initial state: r₀ = b − A x₀, or r₀ = b when the caller
    /// guarantees x₀ = 0 (skipping the first matvec).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a: &'a M,
        pc: Option<&'a dyn Preconditioner<Vec<T>>>,
        b: &[T],
        x: &'a mut Vec<T>,
        state: &'a mut CgStateVariables<T>,
        conv: Convergence<T>,
        initially_zero: bool,
        verbose: bool,
    ) -> Self {
        let ip = ();
        let n = b.len();
        state.resize(n);
        if initially_zero {
            state.r.copy_from_slice(b);
        } else {
            a.apply(x, &mut state.c);
            for ((rj, bj), cj) in state.r.iter_mut().zip(b).zip(&state.c) {
                *rj = *bj - *cj;
            }
        }
        let residual = ip.norm(&state.r);
        Self { a, pc, x, state, rho: T::one(), residual, conv, iter: 0, failed: false, verbose }
    }

    /// One matvec was spent in `new` unless the initial guess was zero.
    pub fn initial_mv_products(initially_zero: bool) -> usize {
        if initially_zero { 0 } else { 1 }
    }

    pub fn residual(&self) -> T {
        self.residual
    }

    pub fn converged(&self) -> bool {
        self.conv.met(self.residual)
    }

    fn done(&self) -> bool {
        self.failed || self.conv.met(self.residual) || self.iter >= self.conv.budget
    }
}

impl<'a, M, T> Iterator for CgIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    type Item = Result<T, SolverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done() {
            return None;
        }
        let ip = ();
        let CgStateVariables { r, c, u } = &mut *self.state;

        // rho = <z, r> with z = P⁻¹r; the pc = None path never touches c.
        let rho_new = match self.pc {
            Some(pc) => {
                if let Err(e) = pc.apply(r, c) {
                    self.failed = true;
                    return Some(Err(e));
                }
                ip.dot(c, r)
            }
            None => ip.dot(r, r),
        };
        let beta = rho_new / self.rho;
        self.rho = rho_new;

        // u = z + beta * u
        let z: &Vec<T> = if self.pc.is_some() { c } else { r };
        for (uj, zj) in u.iter_mut().zip(z.iter()) {
            *uj = *zj + beta * *uj;
        }

        // c = A u
        self.a.apply(u, c);
        let uc = ip.dot(u, c);
        if uc <= T::zero() {
            self.failed = true;
            return Some(Err(SolverError::NotPositiveSemidefinite));
        }
        let alpha = self.rho / uc;

        for (xj, uj) in self.x.iter_mut().zip(u.iter()) {
            *xj = *xj + alpha * *uj;
        }
        for (rj, cj) in r.iter_mut().zip(c.iter()) {
            *rj = *rj - alpha * *cj;
        }
        self.residual = ip.norm(r);
        self.iter += 1;
        if self.verbose {
            log::debug!(
                "cg: iter {} residual {:.3e}",
                self.iter,
                self.residual.to_f64().unwrap_or(f64::NAN)
            );
        }
        Some(Ok(self.residual))
    }
}

/// CG/PCG driver. Owns the buffer bundle, so repeated solves with the same
/// dimensions reuse allocations.
pub struct CgSolver<T> {
    pub opts: CgOptions<T>,
    state: CgStateVariables<T>,
}

impl<T: Float> CgSolver<T> {
    pub fn new(opts: CgOptions<T>) -> Self {
        Self { opts, state: CgStateVariables::zeros(0) }
    }

    /// Supply a pre-allocated buffer bundle.
    pub fn with_state(mut self, state: CgStateVariables<T>) -> Self {
        self.state = state;
        self
    }
}

impl<M, V, T> IterativeSolver<M, V> for CgSolver<T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
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
        let ip = ();
        let n = b.as_ref().len();
        let b_vec = b.as_ref().to_vec();
        let mut x_vec = x.as_ref().to_vec();
        let budget = self.opts.max_iters.unwrap_or_else(|| default_max_iters(n));
        let conv = Convergence::new(self.opts.abstol, self.opts.reltol, ip.norm(&b_vec), budget);
        let mut history = ConvergenceHistory::new(conv.threshold);
        if self.opts.log {
            history.reserve(budget);
        }
        let pc_vec = pc.map(|p| as_vec_preconditioner::<V, T>(p, n));
        let mut iteration = CgIteration::new(
            a,
            pc_vec.as_ref().map(|p| p as &dyn Preconditioner<Vec<T>>),
            &b_vec,
            &mut x_vec,
            &mut self.state,
            conv,
            self.opts.initially_zero,
            self.opts.verbose,
        );
        history.add_mv_products(CgIteration::<M, T>::initial_mv_products(self.opts.initially_zero));
        while let Some(step) = iteration.next() {
            let res_norm = step?;
            history.add_mv_products(1);
            history.push_residual(res_norm, self.opts.log);
        }
        history.set_converged(iteration.converged());
        drop(iteration);
        history.shrink_to_fit();
        *x = V::from(x_vec);
        Ok(history)
    }
}

/// Bridge a `Preconditioner<V>` to the `Vec<T>` the engines run on.
///
/// The scratch vectors are allocated once when the bridge is built; each
/// apply copies through them rather than allocating.
pub(crate) struct VecPreconditioner<'p, V> {
    inner: &'p dyn Preconditioner<V>,
    r_scratch: RefCell<V>,
    z_scratch: RefCell<V>,
}

pub(crate) fn as_vec_preconditioner<'p, V, T>(
    pc: &'p dyn Preconditioner<V>,
    n: usize,
) -> VecPreconditioner<'p, V>
where
    V: From<Vec<T>>,
    T: Float,
{
    VecPreconditioner {
        inner: pc,
        r_scratch: RefCell::new(V::from(vec![T::zero(); n])),
        z_scratch: RefCell::new(V::from(vec![T::zero(); n])),
    }
}

impl<'p, V, T> Preconditioner<Vec<T>> for VecPreconditioner<'p, V>
where
    V: AsRef<[T]> + AsMut<[T]> + From<Vec<T>> + Clone,
    T: Float,
{
    fn apply(&self, r: &Vec<T>, z: &mut Vec<T>) -> Result<(), SolverError> {
        let mut rv = self.r_scratch.borrow_mut();
        let mut zv = self.z_scratch.borrow_mut();
        rv.as_mut().copy_from_slice(r);
        self.inner.apply(&rv, &mut zv)?;
        z.copy_from_slice(zv.as_ref());
        Ok(())
    }

    fn apply_in_place(&self, v: &mut Vec<T>) -> Result<(), SolverError> {
        let mut vv = self.r_scratch.borrow_mut();
        vv.as_mut().copy_from_slice(v);
        self.inner.apply_in_place(&mut vv)?;
        v.copy_from_slice(vv.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::Jacobi;
    use faer::Mat;

    fn spd_3x3() -> (Mat<f64>, Vec<f64>) {
        // A = [[4,1,0],[1,3,1],[0,1,2]], b = A * [1,2,3]
        let rows = [[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let a = Mat::from_fn(3, 3, |i, j| rows[i][j]);
        let x_true = vec![1.0, 2.0, 3.0];
        let mut b = vec![0.0; 3];
        a.apply(&x_true, &mut b);
        (a, b)
    }

    #[test]
    fn cg_solves_simple_spd() {
        // SPD system: [[4,1],[1,3]] x = [1,2]
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 4.0 - (i as f64) } else { 1.0 });
        let b = vec![1.0, 2.0];
        let mut solver = CgSolver::new(CgOptions { reltol: 1e-10, ..Default::default() });
        let (x, history) = solver.solve(&a, None, &b).unwrap();
        let expected = [0.09090909090909091, 0.6363636363636364];
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert!((xi - ei).abs() < 1e-8, "xi = {}, expected = {}", xi, ei);
        }
        assert!(history.is_converged, "CG did not converge");
    }

    #[test]
    fn cg_diagonal_system_converges_in_three_products() {
        // A = diag(2,3,4), b = (2,3,4), exact solution (1,1,1)
        let diag = [2.0, 3.0, 4.0];
        let a = Mat::from_fn(3, 3, |i, j| if i == j { diag[i] } else { 0.0 });
        let b = vec![2.0, 3.0, 4.0];
        let mut solver = CgSolver::new(CgOptions {
            abstol: 1e-10,
            reltol: 0.0,
            max_iters: Some(3),
            initially_zero: true,
            ..Default::default()
        });
        let (x, history) = solver.solve(&a, None, &b).unwrap();
        for xi in &x {
            assert!((xi - 1.0).abs() < 1e-10);
        }
        assert!(history.is_converged);
        assert!(history.mv_products <= 3, "mv products = {}", history.mv_products);
    }

    #[test]
    fn pcg_with_jacobi_matches_plain_cg() {
        let (a, b) = spd_3x3();
        let pc = Jacobi::setup(&a).unwrap();
        let opts = CgOptions { reltol: 1e-12, ..Default::default() };
        let (x_plain, h_plain) = CgSolver::new(opts).solve(&a, None, &b).unwrap();
        let (x_pc, h_pc) = CgSolver::new(opts).solve(&a, Some(&pc), &b).unwrap();
        assert!(h_plain.is_converged && h_pc.is_converged);
        for (xi, xj) in x_plain.iter().zip(x_pc.iter()) {
            assert!((xi - xj).abs() < 1e-8, "plain and preconditioned CG differ");
        }
    }

    #[test]
    fn preconditioner_bridge_matches_direct_application() {
        let (a, _) = spd_3x3();
        let pc = Jacobi::setup(&a).unwrap();
        let bridge = as_vec_preconditioner(&pc as &dyn Preconditioner<Vec<f64>>, 3);
        let r = vec![4.0, 3.0, 2.0];
        let mut expected = vec![0.0; 3];
        pc.apply(&r, &mut expected).unwrap();
        let mut z = vec![0.0; 3];
        bridge.apply(&r, &mut z).unwrap();
        assert_eq!(z, expected);
        let mut v = r.clone();
        bridge.apply_in_place(&mut v).unwrap();
        assert_eq!(v, expected);
    }

    #[test]
    fn cg_reports_indefinite_matrix() {
        // -I is symmetric negative definite
        let a = Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 });
        let b = vec![1.0, 1.0];
        let mut solver = CgSolver::new(CgOptions::default());
        match solver.solve(&a, None, &b) {
            Err(SolverError::NotPositiveSemidefinite) => {}
            other => panic!("expected NotPositiveSemidefinite, got {:?}", other.map(|r| r.1)),
        }
    }

    #[test]
    fn history_trace_matches_iteration_count() {
        let (a, b) = spd_3x3();
        let mut solver = CgSolver::new(CgOptions { reltol: 1e-12, ..Default::default() });
        let (x, history) = solver.solve(&a, None, &b).unwrap();
        assert_eq!(history.residuals().len(), history.iters);
        // Final trace entry matches an independent residual recomputation
        let mut ax = vec![0.0; 3];
        a.apply(&x, &mut ax);
        let true_res: f64 = b
            .iter()
            .zip(&ax)
            .map(|(bi, axi)| (bi - axi) * (bi - axi))
            .sum::<f64>()
            .sqrt();
        let last = history.last_residual().unwrap();
        assert!((last - true_res).abs() < 1e-10, "tracked {last} vs true {true_res}");
    }

    #[test]
    fn non_convergence_is_silent() {
        let (a, b) = spd_3x3();
        let mut solver = CgSolver::new(CgOptions {
            reltol: 1e-14,
            max_iters: Some(1),
            ..Default::default()
        });
        let (_, history) = solver.solve(&a, None, &b).unwrap();
        assert!(!history.is_converged);
        assert_eq!(history.iters, 1);
    }
}
