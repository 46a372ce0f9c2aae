//! Backend adapters for faer dense matrices, plain vectors and closures.
//!
//! This module implements the capability traits for `faer::Mat`,
//! `faer::MatRef` and `Vec<T>`, so dense matrices and Rust vectors can be
//! used directly with every engine in the crate. It also provides
//! [`FnOperator`], a closure-backed adapter for operators that are never
//! materialized as a matrix (stencils, composed maps, `(A - σI)⁻¹` wrappers
//! for the inverse power iteration).
//!
//! Inner products and norms optionally run on Rayon under the `rayon`
//! feature; the reduction order differs from the serial path, so bit-exact
//! reproducibility across the two builds is not promised (within one build
//! it is).

use crate::core::traits::{Apply, ApplyAdjoint, EntryAccess, Indexing, InnerProduct};
use faer::{Mat, MatRef};
use num_traits::Float;
use std::marker::PhantomData;

/// Matrix-vector product y = A · x for a dense faer matrix.
impl<T: Float> Apply<Vec<T>> for Mat<T> {
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.ncols(), x.len(), "input vector x has incorrect length");
        assert_eq!(self.nrows(), y.len(), "output vector y has incorrect length");
        for i in 0..self.nrows() {
            let mut acc = T::zero();
            for j in 0..self.ncols() {
                acc = acc + self[(i, j)] * x[j];
            }
            y[i] = acc;
        }
    }
}

impl<'a, T: Float> Apply<Vec<T>> for MatRef<'a, T> {
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.ncols(), x.len(), "input vector x has incorrect length");
        assert_eq!(self.nrows(), y.len(), "output vector y has incorrect length");
        for i in 0..self.nrows() {
            let mut acc = T::zero();
            for j in 0..self.ncols() {
                acc = acc + self[(i, j)] * x[j];
            }
            y[i] = acc;
        }
    }
}

/// Adjoint product y = Aᵀ · x for a dense faer matrix.
impl<T: Float> ApplyAdjoint<Vec<T>> for Mat<T> {
    fn apply_adjoint(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.nrows(), x.len(), "input vector x has incorrect length");
        assert_eq!(self.ncols(), y.len(), "output vector y has incorrect length");
        for j in 0..self.ncols() {
            let mut acc = T::zero();
            for i in 0..self.nrows() {
                acc = acc + self[(i, j)] * x[i];
            }
            y[j] = acc;
        }
    }
}

impl<T: Float> EntryAccess<T> for Mat<T> {
    fn entry(&self, row: usize, col: usize) -> T {
        self[(row, col)]
    }
}

impl<'a, T: Float> EntryAccess<T> for MatRef<'a, T> {
    fn entry(&self, row: usize, col: usize) -> T {
        self[(row, col)]
    }
}

/// Inner product and norm for vectors, Rayon-parallel when enabled.
impl<T: Float + From<f64> + Send + Sync> InnerProduct<Vec<T>> for () {
    type Scalar = T;

    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        assert_eq!(x.len(), y.len(), "vectors must have the same length");
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .zip(y.as_slice().par_iter())
                .map(|(xi, yi)| *xi * *yi)
                .reduce(|| T::zero(), |acc, v| acc + v)
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .zip(y.iter())
                .map(|(xi, yi)| *xi * *yi)
                .fold(T::zero(), |acc, v| acc + v)
        }
    }

    fn norm(&self, x: &Vec<T>) -> T {
        self.dot(x, x).sqrt()
    }
}

/// A matrix-free operator built from a closure and a dimension.
///
/// The closure receives the input slice and the (zeroed or stale) output
/// slice and must write y = A·x. This is the seam that lets CG, BiCGStab(l)
/// and IDR(s) run on operators that exist only as code.
pub struct FnOperator<T, F> {
    n: usize,
    f: F,
    _marker: PhantomData<T>,
}

impl<T, F> FnOperator<T, F>
where
    F: Fn(&[T], &mut [T]),
{
    pub fn new(n: usize, f: F) -> Self {
        Self { n, f, _marker: PhantomData }
    }
}

impl<T, F> Apply<Vec<T>> for FnOperator<T, F>
where
    F: Fn(&[T], &mut [T]),
{
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.n, x.len(), "input vector x has incorrect length");
        assert_eq!(self.n, y.len(), "output vector y has incorrect length");
        (self.f)(x.as_slice(), y.as_mut_slice());
    }
}

impl<T, F> Indexing for FnOperator<T, F> {
    fn nrows(&self) -> usize {
        self.n
    }
}

impl<T> Indexing for Vec<T> {
    fn nrows(&self) -> usize {
        self.len()
    }
}

impl<T> Indexing for Mat<T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }
}

impl<'a, T> Indexing for MatRef<'a, T> {
    fn nrows(&self) -> usize {
        self.nrows()
    }
}
