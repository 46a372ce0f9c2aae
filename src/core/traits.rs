//! Core linear-algebra capability traits for itersolve.

/// Operator application: y ← A x.
///
/// This is the only capability the Krylov engines require of `A`; a dense
/// matrix, a sparse matrix or a closure over a stencil all qualify.
pub trait Apply<V> {
    /// Compute y = A · x.
    fn apply(&self, x: &V, y: &mut V);
}

/// Adjoint application: y ← Aᵀ x. Optional capability, only needed by
/// adjoint-aware methods.
pub trait ApplyAdjoint<V> {
    /// Compute y = Aᵀ · x.
    fn apply_adjoint(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd + From<f64>;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// Uniform indexing into vectors (dense or sparse).
pub trait Indexing {
    /// Number of rows (or length for a vector).
    fn nrows(&self) -> usize;
}

/// Elementwise read access to an explicit matrix.
///
/// The stationary sweeps need individual entries, not just matvecs, so they
/// require this capability instead of [`Apply`].
pub trait EntryAccess<T>: Indexing {
    /// Entry A[(row, col)].
    fn entry(&self, row: usize, col: usize) -> T;
}
