// Jacobi (inverse diagonal) preconditioner

use crate::core::traits::EntryAccess;
use crate::error::SolverError;
use crate::preconditioner::Preconditioner;
use num_traits::Float;

/// Jacobi preconditioner: P⁻¹ = D⁻¹.
pub struct Jacobi<T> {
    inv_diag: Vec<T>,
}

impl<T: Float> Jacobi<T> {
    /// Extract the inverse diagonal from an explicit matrix, refusing a
    /// zero diagonal entry.
    pub fn setup<M: EntryAccess<T>>(a: &M) -> Result<Self, SolverError> {
        let n = a.nrows();
        let mut inv_diag = vec![T::zero(); n];
        for i in 0..n {
            let aii = a.entry(i, i);
            if aii == T::zero() {
                return Err(SolverError::SingularDiagonal(i));
            }
            inv_diag[i] = T::one() / aii;
        }
        Ok(Self { inv_diag })
    }
}

impl<T: Float> Preconditioner<Vec<T>> for Jacobi<T> {
    fn apply(&self, r: &Vec<T>, z: &mut Vec<T>) -> Result<(), SolverError> {
        for (zi, (ri, di)) in z.iter_mut().zip(r.iter().zip(&self.inv_diag)) {
            *zi = *ri * *di;
        }
        Ok(())
    }

    fn apply_in_place(&self, v: &mut Vec<T>) -> Result<(), SolverError> {
        for (vi, di) in v.iter_mut().zip(&self.inv_diag) {
            *vi = *vi * *di;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    #[test]
    fn jacobi_applies_inverse_diagonal() {
        let a = Mat::from_fn(3, 3, |i, j| if i == j { (i + 2) as f64 } else { 1.0 });
        let pc = Jacobi::setup(&a).unwrap();
        let r = vec![2.0, 3.0, 4.0];
        let mut z = vec![0.0; 3];
        pc.apply(&r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 1.0, 1.0]);
        let mut v = r.clone();
        pc.apply_in_place(&mut v).unwrap();
        assert_eq!(v, z);
    }

    #[test]
    fn jacobi_rejects_zero_diagonal() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 0.0 } else { 1.0 });
        match Jacobi::setup(&a) {
            Err(SolverError::SingularDiagonal(0)) => {}
            other => panic!("expected SingularDiagonal(0), got {:?}", other.err()),
        }
    }
}
