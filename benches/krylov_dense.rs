use criterion::{Criterion, black_box, criterion_group, criterion_main};
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use itersolve::CgOptions;
use itersolve::solver::{CgSolver, IterativeSolver};

fn bench_cg_vs_direct(c: &mut Criterion) {
    let n = 200;
    let data: Vec<f64> = (0..n * n).map(|i| (i as f64).sin()).collect();
    let m = Mat::from_fn(n, n, |i, j| data[j * n + i]);
    let m_t = m.transpose();
    let a = &m_t * &m + Mat::<f64>::identity(n, n);
    let b: Vec<f64> = (0..n).map(|i| (i as f64).cos()).collect();

    c.bench_function("itersolve CG", |ben| {
        let mut solver = CgSolver::new(CgOptions {
            reltol: 1e-10,
            max_iters: Some(4 * n),
            ..Default::default()
        });
        ben.iter(|| {
            let _ = solver.solve(black_box(&a), None, black_box(&b)).unwrap();
        })
    });

    c.bench_function("faer direct LU", |ben| {
        ben.iter(|| {
            let factor = faer::linalg::solvers::FullPivLu::new(a.as_ref());
            let mut y = b.clone();
            let n = y.len();
            let y_mat = faer::MatMut::from_column_major_slice_mut(&mut y, n, 1);
            factor.solve_in_place_with_conj(faer::Conj::No, y_mat);
        })
    });
}

criterion_group!(benches, bench_cg_vs_direct);
criterion_main!(benches);
