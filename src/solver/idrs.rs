//! IDR(s) with bi-orthogonalization (van Gijzen & Sonneveld 2011).
//!
//! Maintains s paired vectors (Uₖ, Gₖ) spanning shrinking nested
//! subspaces and a random projection basis P that is sampled once at solve
//! start and stays fixed for the whole run. Each inner step spends one
//! matrix-vector product; after s inner steps an extra omega step projects
//! the residual into the next subspace, with the damping factor boosted by
//! the √2/2 angle rule when t and r are nearly orthogonal.

use crate::config::options::{IdrsOptions, default_max_iters};
use crate::core::traits::{Apply, InnerProduct};
use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::solver::IterativeSolver;
use crate::utils::convergence::{Convergence, ConvergenceHistory};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Resumable IDR(s) state machine. Each `next()` spends exactly one
/// matrix-vector product (an inner step or the omega step) and yields the
/// residual norm, so the budget counts at per-product granularity.
pub struct IdrsIteration<'a, M, T> {
    a: &'a M,
    pc: Option<&'a dyn Preconditioner<Vec<T>>>,
    x: &'a mut Vec<T>,
    s: usize,
    r: Vec<T>,
    /// Fixed random projection basis, s vectors.
    p: Vec<Vec<T>>,
    u: Vec<Vec<T>>,
    g: Vec<Vec<T>>,
    /// s×s projection matrix M = Pᵀ G, row-major.
    m: Vec<T>,
    f: Vec<T>,
    v: Vec<T>,
    q: Vec<T>,
    om: T,
    /// Next inner step, or the omega step when k == s.
    k: usize,
    residual: T,
    conv: Convergence<T>,
    iter: usize,
    failed: bool,
    verbose: bool,
}

impl<'a, M, T> IdrsIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    /// Build the initial state: r₀ = b − A x₀ (one matvec) and the fixed
    /// projection basis P from `rng`.
    pub fn new(
        a: &'a M,
        pc: Option<&'a dyn Preconditioner<Vec<T>>>,
        b: &[T],
        x: &'a mut Vec<T>,
        s: usize,
        conv: Convergence<T>,
        rng: &mut StdRng,
        verbose: bool,
    ) -> Self {
        assert!(s >= 1, "idrs requires s >= 1");
        let ip = ();
        let n = b.len();
        let mut r = vec![T::zero(); n];
        a.apply(x, &mut r);
        for (rj, bj) in r.iter_mut().zip(b) {
            *rj = *bj - *rj;
        }
        let p: Vec<Vec<T>> = (0..s)
            .map(|_| (0..n).map(|_| rng.r#gen::<f64>().into()).collect())
            .collect();
        // M starts as the identity
        let mut m = vec![T::zero(); s * s];
        for i in 0..s {
            m[i * s + i] = T::one();
        }
        let residual = ip.norm(&r);
        Self {
            a,
            pc,
            x,
            s,
            r,
            p,
            u: vec![vec![T::zero(); n]; s],
            g: vec![vec![T::zero(); n]; s],
            m,
            f: vec![T::zero(); s],
            v: vec![T::zero(); n],
            q: vec![T::zero(); n],
            om: T::one(),
            k: 0,
            residual,
            conv,
            iter: 0,
            failed: false,
            verbose,
        }
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

    /// Forward substitution on the lower-triangular trailing block
    /// M[k.., k..] c = f[k..].
    fn lower_solve(&self) -> Vec<T> {
        let (s, k) = (self.s, self.k);
        let dim = s - k;
        let mut c = vec![T::zero(); dim];
        for i in 0..dim {
            let mut acc = self.f[k + i];
            for j in 0..i {
                acc = acc - self.m[(k + i) * s + (k + j)] * c[j];
            }
            c[i] = acc / self.m[(k + i) * s + (k + i)];
        }
        c
    }
}

/// Damping factor ω = ⟨t,s⟩/‖t‖², boosted toward ‖s‖/‖t‖ when the angle
/// between t and s exceeds the √2/2 threshold.
fn damped_omega<T>(t: &Vec<T>, s: &Vec<T>) -> T
where
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    let ip = ();
    let angle: T = (std::f64::consts::SQRT_2 / 2.0).into();
    let ns = ip.norm(s);
    let nt = ip.norm(t);
    let ts = ip.dot(t, s);
    let rho = (ts / (nt * ns)).abs();
    let mut om = ts / (nt * nt);
    if rho < angle {
        om = om * angle / rho;
    }
    om
}

impl<'a, M, T> Iterator for IdrsIteration<'a, M, T>
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
        let s = self.s;
        if self.k < s {
            let k = self.k;
            if k == 0 {
                for i in 0..s {
                    self.f[i] = ip.dot(&self.p[i], &self.r);
                }
            }
            // Combination of existing G/U columns orthogonal to P[..k]
            let c = self.lower_solve();
            self.v.iter_mut().for_each(|vj| *vj = T::zero());
            self.q.iter_mut().for_each(|qj| *qj = T::zero());
            for (i, ci) in c.iter().enumerate() {
                for (vj, gj) in self.v.iter_mut().zip(self.g[k + i].iter()) {
                    *vj = *vj + *ci * *gj;
                }
                for (qj, uj) in self.q.iter_mut().zip(self.u[k + i].iter()) {
                    *qj = *qj + *ci * *uj;
                }
            }
            for (vj, rj) in self.v.iter_mut().zip(self.r.iter()) {
                *vj = *rj - *vj;
            }
            if let Some(pc) = self.pc {
                if let Err(e) = pc.apply_in_place(&mut self.v) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
            // u[k] = q + om * v, g[k] = A u[k]
            for ((ukj, qj), vj) in self.u[k].iter_mut().zip(self.q.iter()).zip(self.v.iter()) {
                *ukj = *qj + self.om * *vj;
            }
            {
                let (gh, gt) = self.g.split_at_mut(k);
                self.a.apply(&self.u[k], &mut gt[0]);
                // Bi-orthogonalize against P[..k]
                let (uh, ut) = self.u.split_at_mut(k);
                for i in 0..k {
                    let alpha = ip.dot(&self.p[i], &gt[0]) / self.m[i * s + i];
                    for (gkj, gij) in gt[0].iter_mut().zip(gh[i].iter()) {
                        *gkj = *gkj - alpha * *gij;
                    }
                    for (ukj, uij) in ut[0].iter_mut().zip(uh[i].iter()) {
                        *ukj = *ukj - alpha * *uij;
                    }
                }
            }
            // Refresh column k of M = Pᵀ G
            for i in k..s {
                self.m[i * s + k] = ip.dot(&self.p[i], &self.g[k]);
            }
            // Annihilate r along P[k]
            let beta = self.f[k] / self.m[k * s + k];
            for (rj, gj) in self.r.iter_mut().zip(self.g[k].iter()) {
                *rj = *rj - beta * *gj;
            }
            for (xj, uj) in self.x.iter_mut().zip(self.u[k].iter()) {
                *xj = *xj + beta * *uj;
            }
            self.residual = ip.norm(&self.r);
            for i in (k + 1)..s {
                self.f[i] = self.f[i] - beta * self.m[i * s + k];
            }
            self.k += 1;
        } else {
            // Omega step: r is already orthogonal to P, so v = r
            self.v.copy_from_slice(&self.r);
            if let Some(pc) = self.pc {
                if let Err(e) = pc.apply_in_place(&mut self.v) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
            self.a.apply(&self.v, &mut self.q);
            self.om = damped_omega(&self.q, &self.r);
            for (rj, qj) in self.r.iter_mut().zip(self.q.iter()) {
                *rj = *rj - self.om * *qj;
            }
            for (xj, vj) in self.x.iter_mut().zip(self.v.iter()) {
                *xj = *xj + self.om * *vj;
            }
            self.residual = ip.norm(&self.r);
            self.k = 0;
        }
        self.iter += 1;
        if self.verbose {
            log::debug!(
                "idrs: step {} residual {:.3e}",
                self.iter,
                self.residual.to_f64().unwrap_or(f64::NAN)
            );
        }
        Some(Ok(self.residual))
    }
}

/// IDR(s) driver.
pub struct IdrsSolver<T> {
    pub opts: IdrsOptions<T>,
}

impl<T: Float> IdrsSolver<T> {
    pub fn new(opts: IdrsOptions<T>) -> Self {
        Self { opts }
    }
}

impl<M, V, T> IterativeSolver<M, V> for IdrsSolver<T>
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
        let mut rng = match self.opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pc_vec = pc.map(|p| crate::solver::cg::as_vec_preconditioner::<V, T>(p, n));
        let mut iteration = IdrsIteration::new(
            a,
            pc_vec.as_ref().map(|p| p as &dyn Preconditioner<Vec<T>>),
            &b_vec,
            &mut x_vec,
            self.opts.s,
            conv,
            &mut rng,
            self.opts.verbose,
        );
        history.add_mv_products(1);
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

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn nonsym(n: usize) -> (Mat<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(11);
        let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() - 0.5).collect();
        let a = Mat::from_fn(n, n, |i, j| {
            if i == j { (n as f64) + 1.0 } else { data[j * n + i] }
        });
        let b: Vec<f64> = (0..n).map(|i| 1.0 + (i as f64) / n as f64).collect();
        (a, b)
    }

    #[test]
    fn idrs_solves_nonsymmetric() {
        let (a, b) = nonsym(10);
        let b_norm = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        for s in [2, 4, 8] {
            let mut solver = IdrsSolver::new(IdrsOptions {
                s,
                reltol: 1e-10,
                max_iters: Some(400),
                seed: Some(5),
                ..Default::default()
            });
            let (x, history) = solver.solve(&a, None, &b).unwrap();
            assert!(history.is_converged, "s = {s} did not converge");
            let mut ax = vec![0.0; b.len()];
            a.apply(&x, &mut ax);
            let rel = b
                .iter()
                .zip(&ax)
                .map(|(bi, axi)| (bi - axi) * (bi - axi))
                .sum::<f64>()
                .sqrt()
                / b_norm;
            assert!(rel < 1e-9, "s = {s}: relative residual {rel:e}");
        }
    }

    #[test]
    fn idrs_is_deterministic_for_fixed_seed() {
        let (a, b) = nonsym(8);
        let opts = IdrsOptions {
            s: 4,
            reltol: 1e-10,
            max_iters: Some(400),
            seed: Some(99),
            ..Default::default()
        };
        let (x1, h1) = IdrsSolver::new(opts).solve(&a, None, &b).unwrap();
        let (x2, h2) = IdrsSolver::new(opts).solve(&a, None, &b).unwrap();
        assert_eq!(x1, x2);
        assert_eq!(h1.residuals(), h2.residuals());
    }

    #[test]
    fn idrs_counts_at_matvec_granularity() {
        let (a, b) = nonsym(8);
        let mut solver = IdrsSolver::new(IdrsOptions {
            s: 4,
            reltol: 1e-12,
            max_iters: Some(37),
            seed: Some(3),
            ..Default::default()
        });
        let (_, history) = solver.solve(&a, None, &b).unwrap();
        // 1 initial product + one per executed step
        assert_eq!(history.mv_products, history.iters + 1);
        assert!(history.iters <= 37);
    }
}
