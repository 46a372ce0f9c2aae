//! BiCGStab(l) (Sleijpen & Fokkema 1993).
//!
//! Generalizes CG to nonsymmetric A: each outer cycle runs l Bi-CG steps
//! against a fixed random shadow vector, extending an (l+1)-column block of
//! residual and update vectors, then collapses the block with the
//! polynomial coefficients that minimize the new residual norm. Two
//! coefficient strategies are supported: plain minimal residual, and the
//! Sleijpen–van der Vorst maintaining-convergence blend of the minimal
//! residual and orthogonal polynomials.
//!
//! The Gram system solved each cycle can become near-singular when the
//! residual directions collapse; this is a known stability edge case of
//! the method and is deliberately not patched with regularization. Only an
//! exactly singular pivot is reported, as a breakdown error.

use crate::config::options::{BiCgStabLOptions, PolynomialMode, default_max_mv_products};
use crate::core::traits::{Apply, InnerProduct};
use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use crate::solver::IterativeSolver;
use crate::utils::convergence::{Convergence, ConvergenceHistory};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Resumable BiCGStab(l) state machine. Each `next()` runs one outer cycle
/// (2l matrix-vector products) and yields the residual norm; the budget is
/// on matvec products, never on cycle count.
pub struct BiCgStabLIteration<'a, M, T> {
    a: &'a M,
    pc: Option<&'a dyn Preconditioner<Vec<T>>>,
    x: &'a mut Vec<T>,
    l: usize,
    polynomial: PolynomialMode,
    r_shadow: Vec<T>,
    /// l+1 residual columns; rs[0] is the current residual.
    rs: Vec<Vec<T>>,
    /// l+1 update columns; us[0] is the current update direction.
    us: Vec<Vec<T>>,
    gamma: Vec<T>,
    /// (l+1)×(l+1) Gram matrix of rs, row-major.
    gram: Vec<T>,
    omega: T,
    sigma: T,
    residual: T,
    conv: Convergence<T>,
    mv_products: usize,
    cycle: usize,
    failed: bool,
    verbose: bool,
}

impl<'a, M, T> BiCgStabLIteration<'a, M, T>
where
    M: Apply<Vec<T>>,
    (): InnerProduct<Vec<T>, Scalar = T>,
    T: Float + From<f64>,
{
    /// Build the initial state. The shadow vector is sampled once from
    /// `rng` and stays fixed for the whole run. `conv.budget` caps
    /// matrix-vector products.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a: &'a M,
        pc: Option<&'a dyn Preconditioner<Vec<T>>>,
        b: &[T],
        x: &'a mut Vec<T>,
        l: usize,
        polynomial: PolynomialMode,
        conv: Convergence<T>,
        rng: &mut StdRng,
        initially_zero: bool,
        verbose: bool,
    ) -> Result<Self, SolverError> {
        assert!(l >= 1, "bicgstabl requires l >= 1");
        let ip = ();
        let n = b.len();
        let mut rs = vec![vec![T::zero(); n]; l + 1];
        let us = vec![vec![T::zero(); n]; l + 1];
        let mut mv_products = 0;
        if initially_zero {
            rs[0].copy_from_slice(b);
        } else {
            a.apply(x, &mut rs[0]);
            for (rj, bj) in rs[0].iter_mut().zip(b) {
                *rj = *bj - *rj;
            }
            mv_products += 1;
        }
        if let Some(pc) = pc {
            pc.apply_in_place(&mut rs[0])?;
        }
        let r_shadow: Vec<T> = (0..n).map(|_| rng.r#gen::<f64>().into()).collect();
        let residual = ip.norm(&rs[0]);
        Ok(Self {
            a,
            pc,
            x,
            l,
            polynomial,
            r_shadow,
            rs,
            us,
            gamma: vec![T::zero(); l],
            gram: vec![T::zero(); (l + 1) * (l + 1)],
            omega: T::one(),
            sigma: T::one(),
            residual,
            conv,
            mv_products,
            cycle: 0,
            failed: false,
            verbose,
        })
    }

    pub fn residual(&self) -> T {
        self.residual
    }

    pub fn mv_products(&self) -> usize {
        self.mv_products
    }

    pub fn converged(&self) -> bool {
        self.conv.met(self.residual)
    }

    fn done(&self) -> bool {
        self.failed || self.conv.met(self.residual) || self.mv_products >= self.conv.budget
    }

    /// Minimal-residual coefficients: the l×l normal-equations system
    /// gram[1.., 1..] γ = gram[1.., 0].
    fn mr_coefficients(&self) -> Result<Vec<T>, SolverError> {
        let l = self.l;
        let dim = l + 1;
        let m: Vec<T> = (0..l)
            .flat_map(|i| (0..l).map(move |j| self.gram[(i + 1) * dim + (j + 1)]))
            .collect();
        let rhs: Vec<T> = (0..l).map(|i| self.gram[(i + 1) * dim]).collect();
        solve_dense(m, rhs, l)
    }

    /// Maintaining-convergence coefficients: blend the minimal-residual
    /// polynomial y₀ with the orthogonal polynomial y_l, keeping the angle
    /// between them away from 90° (κ = 0.7).
    fn convex_coefficients(&self) -> Result<Vec<T>, SolverError> {
        let l = self.l;
        let dim = l + 1;
        let interior = l - 1;
        let m: Vec<T> = (0..interior)
            .flat_map(|i| (0..interior).map(move |j| self.gram[(i + 1) * dim + (j + 1)]))
            .collect();
        let rhs0: Vec<T> = (0..interior).map(|i| self.gram[(i + 1) * dim]).collect();
        let rhsl: Vec<T> = (0..interior).map(|i| self.gram[(i + 1) * dim + l]).collect();
        let w0 = solve_dense(m.clone(), rhs0, interior)?;
        let wl = solve_dense(m, rhsl, interior)?;

        let mut y0 = vec![T::zero(); dim];
        y0[0] = -T::one();
        y0[1..l].copy_from_slice(&w0);
        let mut yl = vec![T::zero(); dim];
        yl[1..l].copy_from_slice(&wl);
        yl[l] = -T::one();

        let zy0 = self.gram_apply(&y0);
        let zyl = self.gram_apply(&yl);
        let kappa0 = small_dot(&y0, &zy0).sqrt();
        let kappal = small_dot(&yl, &zyl).sqrt();
        if kappa0 == T::zero() || kappal == T::zero() {
            return Err(SolverError::Breakdown("degenerate polynomial norms"));
        }
        let rho = small_dot(&yl, &zy0) / (kappa0 * kappal);
        let floor: T = 0.7f64.into();
        let hat = if rho < T::zero() { -rho.abs().max(floor) } else { rho.abs().max(floor) };
        let scale = hat * kappa0 / kappal;
        for (y0j, ylj) in y0.iter_mut().zip(&yl) {
            *y0j = *y0j - scale * *ylj;
        }
        Ok(y0[1..].to_vec())
    }

    fn gram_apply(&self, y: &[T]) -> Vec<T> {
        let dim = self.l + 1;
        (0..dim)
            .map(|i| {
                (0..dim).fold(T::zero(), |acc, j| acc + self.gram[i * dim + j] * y[j])
            })
            .collect()
    }
}

fn small_dot<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter().zip(y).fold(T::zero(), |acc, (xi, yi)| acc + *xi * *yi)
}

/// Solve a k×k row-major dense system by Gaussian elimination with partial
/// pivoting. An exactly zero pivot is a breakdown; near-singularity is the
/// caller's documented edge case.
fn solve_dense<T: Float>(mut m: Vec<T>, mut rhs: Vec<T>, k: usize) -> Result<Vec<T>, SolverError> {
    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&i, &j| {
                m[i * k + col]
                    .abs()
                    .partial_cmp(&m[j * k + col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if m[pivot_row * k + col] == T::zero() {
            return Err(SolverError::Breakdown("singular gram system"));
        }
        if pivot_row != col {
            for j in 0..k {
                m.swap(col * k + j, pivot_row * k + j);
            }
            rhs.swap(col, pivot_row);
        }
        let pivot = m[col * k + col];
        for row in (col + 1)..k {
            let factor = m[row * k + col] / pivot;
            for j in col..k {
                m[row * k + j] = m[row * k + j] - factor * m[col * k + j];
            }
            rhs[row] = rhs[row] - factor * rhs[col];
        }
    }
    let mut y = vec![T::zero(); k];
    for row in (0..k).rev() {
        let mut acc = rhs[row];
        for j in (row + 1)..k {
            acc = acc - m[row * k + j] * y[j];
        }
        y[row] = acc / m[row * k + row];
    }
    Ok(y)
}

impl<'a, M, T> Iterator for BiCgStabLIteration<'a, M, T>
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
        let l = self.l;
        let dim = l + 1;
        self.sigma = -self.omega * self.sigma;

        // Bi-CG part: extend the residual/update blocks by l columns.
        for j in 0..l {
            let rho = ip.dot(&self.r_shadow, &self.rs[j]);
            let beta = rho / self.sigma;
            for i in 0..=j {
                for (uij, rij) in self.us[i].iter_mut().zip(self.rs[i].iter()) {
                    *uij = *rij - beta * *uij;
                }
            }
            {
                let (head, tail) = self.us.split_at_mut(j + 1);
                self.a.apply(&head[j], &mut tail[0]);
                if let Some(pc) = self.pc {
                    if let Err(e) = pc.apply_in_place(&mut tail[0]) {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            self.sigma = ip.dot(&self.r_shadow, &self.us[j + 1]);
            let alpha = rho / self.sigma;
            for i in 0..=j {
                let ui1 = &self.us[i + 1];
                for (rij, uij) in self.rs[i].iter_mut().zip(ui1.iter()) {
                    *rij = *rij - alpha * *uij;
                }
            }
            {
                let (head, tail) = self.rs.split_at_mut(j + 1);
                self.a.apply(&head[j], &mut tail[0]);
                if let Some(pc) = self.pc {
                    if let Err(e) = pc.apply_in_place(&mut tail[0]) {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            for (xj, uj) in self.x.iter_mut().zip(self.us[0].iter()) {
                *xj = *xj + alpha * *uj;
            }
        }
        self.mv_products += 2 * l;

        // Polynomial part: Gram matrix of the residual block, then the
        // combination that collapses it.
        for i in 0..dim {
            for j in i..dim {
                let g = ip.dot(&self.rs[i], &self.rs[j]);
                self.gram[i * dim + j] = g;
                self.gram[j * dim + i] = g;
            }
        }
        let gamma = match self.polynomial {
            PolynomialMode::MinimalResidual => self.mr_coefficients(),
            PolynomialMode::ConvexCombination => self.convex_coefficients(),
        };
        let gamma = match gamma {
            Ok(g) => g,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        self.gamma.copy_from_slice(&gamma);

        // x += rs[0..l] γ, then r -= rs[1..=l] γ and u -= us[1..=l] γ.
        for (k, gk) in self.gamma.iter().enumerate() {
            for (xj, rj) in self.x.iter_mut().zip(self.rs[k].iter()) {
                *xj = *xj + *gk * *rj;
            }
        }
        {
            let (r0, rest) = self.rs.split_at_mut(1);
            for (k, gk) in self.gamma.iter().enumerate() {
                for (rj, cj) in r0[0].iter_mut().zip(rest[k].iter()) {
                    *rj = *rj - *gk * *cj;
                }
            }
        }
        {
            let (u0, rest) = self.us.split_at_mut(1);
            for (k, gk) in self.gamma.iter().enumerate() {
                for (uj, cj) in u0[0].iter_mut().zip(rest[k].iter()) {
                    *uj = *uj - *gk * *cj;
                }
            }
        }
        self.omega = self.gamma[l - 1];
        self.residual = ip.norm(&self.rs[0]);
        self.cycle += 1;
        if self.verbose {
            log::debug!(
                "bicgstabl: cycle {} ({} mv) residual {:.3e}",
                self.cycle,
                self.mv_products,
                self.residual.to_f64().unwrap_or(f64::NAN)
            );
        }
        Some(Ok(self.residual))
    }
}

/// BiCGStab(l) driver.
pub struct BiCgStabLSolver<T> {
    pub opts: BiCgStabLOptions<T>,
}

impl<T: Float> BiCgStabLSolver<T> {
    pub fn new(opts: BiCgStabLOptions<T>) -> Self {
        Self { opts }
    }
}

impl<M, V, T> IterativeSolver<M, V> for BiCgStabLSolver<T>
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
        let budget = self
            .opts
            .max_mv_products
            .unwrap_or_else(|| default_max_mv_products(n));
        let conv = Convergence::new(self.opts.abstol, self.opts.reltol, ip.norm(&b_vec), budget);
        let mut history = ConvergenceHistory::new(conv.threshold);
        if self.opts.log {
            history.reserve(budget / (2 * self.opts.l) + 1);
        }
        let mut rng = match self.opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pc_vec = pc.map(|p| crate::solver::cg::as_vec_preconditioner::<V, T>(p, n));
        let mut iteration = BiCgStabLIteration::new(
            a,
            pc_vec.as_ref().map(|p| p as &dyn Preconditioner<Vec<T>>),
            &b_vec,
            &mut x_vec,
            self.opts.l,
            self.opts.polynomial,
            conv,
            &mut rng,
            self.opts.initially_zero,
            self.opts.verbose,
        )?;
        history.add_mv_products(iteration.mv_products());
        let mut seen = iteration.mv_products();
        while let Some(step) = iteration.next() {
            let res_norm = step?;
            history.add_mv_products(iteration.mv_products() - seen);
            seen = iteration.mv_products();
            history.push_residual(res_norm, self.opts.log);
        }
        history.set_converged(iteration.converged());
        drop(iteration);
        history.shrink_to_fit();
        *x = V::from(x_vec);
        Ok(history)
    }
}
