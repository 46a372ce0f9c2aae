//! Preconditioner apply contract.
//!
//! Only the *apply* side of preconditioning lives here: z ≈ P⁻¹r.
//! Construction of nontrivial preconditioners (incomplete factorizations
//! and friends) is a job for external collaborators. Engines take
//! `Option<&dyn Preconditioner<_>>` where `None` is the identity and costs
//! nothing — no copy, no virtual call.

use crate::error::SolverError;

/// Application of an approximate inverse: z ← P⁻¹ r.
pub trait Preconditioner<V> {
    /// Write z = P⁻¹ r.
    fn apply(&self, r: &V, z: &mut V) -> Result<(), SolverError>;
    /// Overwrite v with P⁻¹ v.
    fn apply_in_place(&self, v: &mut V) -> Result<(), SolverError>;
}

/// The identity preconditioner, for call sites that want a value rather
/// than `None`.
pub struct Identity;

impl<T: Copy> Preconditioner<Vec<T>> for Identity {
    fn apply(&self, r: &Vec<T>, z: &mut Vec<T>) -> Result<(), SolverError> {
        z.copy_from_slice(r);
        Ok(())
    }

    fn apply_in_place(&self, _v: &mut Vec<T>) -> Result<(), SolverError> {
        Ok(())
    }
}

pub mod jacobi;

pub use jacobi::Jacobi;
