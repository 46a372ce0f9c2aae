//! Stationary sweep behavior on diagonally dominant random systems.

use faer::Mat;
use itersolve::StationaryOptions;
use itersolve::solver::{GaussSeidelSolver, IterativeSolver, JacobiSolver, SorSolver, SsorSolver};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random_dominant(n: usize, seed: u64) -> (Mat<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() - 0.5).collect();
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j { n as f64 } else { data[j * n + i] }
    });
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn relative_residual(a: &Mat<f64>, x: &[f64], b: &[f64]) -> f64 {
    let n = b.len();
    let mut acc = 0.0;
    for i in 0..n {
        let mut ri = b[i];
        for j in 0..n {
            ri -= a[(i, j)] * x[j];
        }
        acc += ri * ri;
    }
    let b_norm: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    acc.sqrt() / b_norm
}

#[test]
fn all_sweeps_converge_on_dominant_systems() {
    let opts = StationaryOptions {
        sweeps: 300,
        reltol: 1e-10,
        log: true,
        ..Default::default()
    };
    for seed in [3, 13, 23] {
        let (a, b) = random_dominant(15, seed);
        let (x, h) = JacobiSolver::new(opts).solve(&a, None, &b).unwrap();
        assert!(h.is_converged, "jacobi, seed {seed}");
        assert!(relative_residual(&a, &x, &b) < 1e-9);
        let (x, h) = GaussSeidelSolver::new(opts).solve(&a, None, &b).unwrap();
        assert!(h.is_converged, "gauss-seidel, seed {seed}");
        assert!(relative_residual(&a, &x, &b) < 1e-9);
        let (x, h) = SorSolver::new(opts, 1.1).solve(&a, None, &b).unwrap();
        assert!(h.is_converged, "sor, seed {seed}");
        assert!(relative_residual(&a, &x, &b) < 1e-9);
        let (x, h) = SsorSolver::new(opts, 1.1).solve(&a, None, &b).unwrap();
        assert!(h.is_converged, "ssor, seed {seed}");
        assert!(relative_residual(&a, &x, &b) < 1e-9);
    }
}

#[test]
fn logging_variant_stops_early() {
    let (a, b) = random_dominant(10, 7);
    let opts = StationaryOptions {
        sweeps: 500,
        reltol: 1e-8,
        log: true,
        ..Default::default()
    };
    let (_, h) = GaussSeidelSolver::new(opts).solve(&a, None, &b).unwrap();
    assert!(h.is_converged);
    assert!(h.iters < 500, "expected early exit, ran {} sweeps", h.iters);
    assert_eq!(h.residuals().len(), h.iters);
}

#[test]
fn fixed_contract_never_exits_early() {
    let (a, b) = random_dominant(10, 8);
    let opts = StationaryOptions {
        sweeps: 50,
        reltol: 1e-2,
        log: false,
        ..Default::default()
    };
    let (_, h) = JacobiSolver::new(opts).solve(&a, None, &b).unwrap();
    assert_eq!(h.iters, 50);
    assert!(h.is_converged);
}
