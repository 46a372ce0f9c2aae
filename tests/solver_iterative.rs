//! Krylov engines vs direct solvers on random matrices.
//!
//! Verifies that CG, BiCGStab(l) and IDR(s) reproduce the solutions of
//! faer's direct LU factorization on small random systems, that recorded
//! histories are consistent with an independent residual recomputation,
//! and that non-convergence stays silent.

use approx::assert_abs_diff_eq;
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use itersolve::core::traits::Apply;
use itersolve::solver::{BiCgStabLSolver, CgSolver, IdrsSolver, IterativeSolver};
use itersolve::{BiCgStabLOptions, CgOptions, IdrsOptions};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Random SPD matrix A = MᵀM + I and a random right-hand side.
fn random_spd(n: usize, seed: u64) -> (Mat<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let m = Mat::from_fn(n, n, |i, j| data[j * n + i]);
    let m_t = m.transpose();
    let a = &m_t * &m + Mat::<f64>::identity(n, n);
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

/// Random diagonally dominant nonsymmetric matrix and right-hand side.
fn random_nonsym(n: usize, seed: u64) -> (Mat<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() - 0.5).collect();
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j { n as f64 } else { data[j * n + i] }
    });
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn direct_solve(a: &Mat<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = b.to_vec();
    let lu = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    let x_mat = faer::MatMut::from_column_major_slice_mut(&mut x, n, 1);
    lu.solve_in_place_with_conj(faer::Conj::No, x_mat);
    x
}

fn true_residual(a: &Mat<f64>, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    a.apply(&x.to_vec(), &mut ax);
    b.iter()
        .zip(&ax)
        .map(|(bi, axi)| (bi - axi) * (bi - axi))
        .sum::<f64>()
        .sqrt()
}

#[test]
fn cg_vs_direct_on_spd() {
    let n = 10;
    let (a, b) = random_spd(n, 17);
    let mut solver = CgSolver::new(CgOptions {
        reltol: 1e-10,
        max_iters: Some(1000),
        ..Default::default()
    });
    let (x_cg, history) = solver.solve(&a, None, &b).unwrap();
    assert!(history.is_converged);
    let x_direct = direct_solve(&a, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x_cg[i], x_direct[i], epsilon = 1e-6);
    }
}

#[test]
fn bicgstabl_vs_direct_on_nonsymmetric() {
    let n = 10;
    let (a, b) = random_nonsym(n, 23);
    let mut solver = BiCgStabLSolver::new(BiCgStabLOptions {
        l: 2,
        reltol: 1e-10,
        seed: Some(0),
        ..Default::default()
    });
    let (x_it, history) = solver.solve(&a, None, &b).unwrap();
    assert!(history.is_converged);
    let x_direct = direct_solve(&a, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x_it[i], x_direct[i], epsilon = 1e-6);
    }
}

#[test]
fn idrs_vs_direct_on_nonsymmetric() {
    let n = 10;
    let (a, b) = random_nonsym(n, 29);
    let mut solver = IdrsSolver::new(IdrsOptions {
        s: 4,
        reltol: 1e-10,
        max_iters: Some(500),
        seed: Some(0),
        ..Default::default()
    });
    let (x_it, history) = solver.solve(&a, None, &b).unwrap();
    assert!(history.is_converged);
    let x_direct = direct_solve(&a, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x_it[i], x_direct[i], epsilon = 1e-6);
    }
}

#[test]
fn recorded_history_matches_recomputed_residual() {
    let n = 12;
    let (a, b) = random_spd(n, 31);
    let mut solver = CgSolver::new(CgOptions {
        reltol: 1e-11,
        max_iters: Some(1000),
        ..Default::default()
    });
    let (x, history) = solver.solve(&a, None, &b).unwrap();
    assert_eq!(history.residuals().len(), history.iters);
    let last = history.last_residual().unwrap();
    let recomputed = true_residual(&a, &x, &b);
    assert_abs_diff_eq!(last, recomputed, epsilon = 1e-9);

    let (a, b) = random_nonsym(n, 37);
    let mut solver = BiCgStabLSolver::new(BiCgStabLOptions {
        l: 2,
        reltol: 1e-11,
        seed: Some(4),
        ..Default::default()
    });
    let (x, history) = solver.solve(&a, None, &b).unwrap();
    let last = history.last_residual().unwrap();
    let recomputed = true_residual(&a, &x, &b);
    assert_abs_diff_eq!(last, recomputed, epsilon = 1e-8);
}

#[test]
fn exhausted_budget_is_a_silent_terminal_state() {
    let n = 20;
    let (a, b) = random_spd(n, 41);
    let mut solver = CgSolver::new(CgOptions {
        reltol: 1e-15,
        abstol: 0.0,
        max_iters: Some(2),
        ..Default::default()
    });
    let (x, history) = solver.solve(&a, None, &b).unwrap();
    assert!(!history.is_converged);
    assert_eq!(history.iters, 2);
    // The best available iterate is still returned
    assert!(x.iter().any(|&xi| xi != 0.0));
}
