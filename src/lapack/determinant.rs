//! Determinants that neither overflow nor underflow
//!
//! The determinant of an `n × n` matrix is returned as a [`SafeProduct`]:
//! a unit-modulus factor and the mean logarithm of the pivot magnitudes.

use super::{cholesky, lu};
use crate::blas::UpperOrLower;
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead};
use crate::dtype::{Element, Field, RealField};
use crate::error::{Error, Result};
use crate::grid::CommKind;

/// `ρ · exp(κ n)`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SafeProduct<T: Field> {
    /// Phase (sign for real matrices); zero for a singular matrix
    pub rho: T,
    /// Mean of the logarithms of the pivot magnitudes
    pub kappa: T::Real,
    /// Number of factors
    pub n: usize,
}

impl<T: Field> SafeProduct<T> {
    /// The product of zero factors
    pub fn one(n: usize) -> Self {
        Self {
            rho: T::one(),
            kappa: <T::Real as Element>::zero(),
            n,
        }
    }

    /// A product with a zero factor
    pub fn zero(n: usize) -> Self {
        Self {
            rho: T::zero(),
            kappa: <T::Real as Element>::zero(),
            n,
        }
    }

    /// `ρ · exp(κ n)`, which may overflow
    pub fn value(&self) -> T {
        let n = <T::Real as Element>::from_f64(self.n as f64);
        self.rho * T::from_real((self.kappa * n).exp_val())
    }
}

/// Fold the diagonal of a factored `[MC,MR]` matrix into `(ρ, Σ ln|d|)`
fn diagonal_product<T: Field>(a: &DistMatrix<T>) -> Result<(T, T::Real)> {
    let d = a.get_diagonal(0)?;
    let meta = d.meta();
    let mut rho = T::one();
    let mut log_sum = <T::Real as Element>::zero();
    if meta.participating() && meta.redundant_comm().rank() == 0 {
        let local = d.local();
        for k in 0..local.height() {
            let v = local.get(k, 0);
            let magnitude = v.abs_val();
            rho = rho * (v / T::from_real(magnitude));
            log_sum = log_sum + magnitude.ln_val();
        }
    }
    let vc = a.grid().comm(CommKind::Vc);
    let mut logs = [log_sum];
    vc.all_reduce_sum(&mut logs)?;
    let mut phase = [rho];
    vc.all_reduce_with(&mut phase, |x, y| x * y)?;
    Ok((phase[0], logs[0]))
}

/// Determinant through an LU factorization with partial pivoting
///
/// `A` is left untouched. A singular matrix gives a zero product rather
/// than an error.
pub fn safe_determinant<T, A>(a: &A) -> Result<SafeProduct<T>>
where
    T: Field,
    A: DistRead<T> + ?Sized,
{
    let n = a.height();
    assert_eq!(a.width(), n, "determinants need a square matrix, got {n}x{}", a.width());
    if n == 0 || !a.grid().in_grid() {
        return Ok(SafeProduct::one(n));
    }
    let mut factored = DistMatrix::new(a.grid(), Dist::Mc, Dist::Mr);
    factored.assign(a)?;
    let p = match lu(&mut factored) {
        Ok(p) => p,
        Err(Error::SingularPivot { index }) => {
            tracing::debug!(index, "singular pivot, determinant is zero");
            return Ok(SafeProduct::zero(n));
        }
        Err(err) => return Err(err),
    };

    let (mut rho, log_sum) = diagonal_product(&factored)?;
    let local = p.local();
    let mut swaps = [(0..local.height())
        .filter(|&kl| local.get(kl, 0) != p.meta().global_row(kl) as i64)
        .count() as i64];
    a.grid().comm(CommKind::Vc).all_reduce_sum(&mut swaps)?;
    if swaps[0] % 2 == 1 {
        rho = -rho;
    }
    let count = <T::Real as Element>::from_f64(n as f64);
    Ok(SafeProduct {
        rho,
        kappa: log_sum / count,
        n,
    })
}

/// [`safe_determinant`] evaluated; may overflow for large matrices
pub fn determinant<T, A>(a: &A) -> Result<T>
where
    T: Field,
    A: DistRead<T> + ?Sized,
{
    Ok(safe_determinant(a)?.value())
}

/// Determinant of a Hermitian positive definite matrix through Cholesky
///
/// Only the `uplo` triangle is read. A matrix that turns out not to be
/// positive definite gives a zero product rather than an error.
pub fn safe_hpd_determinant<T, A>(uplo: UpperOrLower, a: &A) -> Result<SafeProduct<T>>
where
    T: Field,
    A: DistRead<T> + ?Sized,
{
    let n = a.height();
    assert_eq!(a.width(), n, "determinants need a square matrix, got {n}x{}", a.width());
    if n == 0 || !a.grid().in_grid() {
        return Ok(SafeProduct::one(n));
    }
    let mut factored = DistMatrix::new(a.grid(), Dist::Mc, Dist::Mr);
    factored.assign(a)?;
    match cholesky(uplo, &mut factored) {
        Ok(()) => {}
        Err(Error::NotPositiveDefinite { index }) => {
            tracing::debug!(index, "matrix is not positive definite, determinant is zero");
            return Ok(SafeProduct::zero(n));
        }
        Err(err) => return Err(err),
    }
    let (_, log_sum) = diagonal_product(&factored)?;
    let two = <T::Real as Element>::from_f64(2.0);
    let count = <T::Real as Element>::from_f64(n as f64);
    Ok(SafeProduct {
        rho: T::one(),
        kappa: two * log_sum / count,
        n,
    })
}

/// [`safe_hpd_determinant`] evaluated; may overflow for large matrices
pub fn hpd_determinant<T, A>(uplo: UpperOrLower, a: &A) -> Result<T>
where
    T: Field,
    A: DistRead<T> + ?Sized,
{
    Ok(safe_hpd_determinant(uplo, a)?.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_product_value() {
        let p = SafeProduct::<f64> {
            rho: -1.0,
            kappa: 2.0f64.ln() / 3.0,
            n: 3,
        };
        assert!((p.value() + 2.0).abs() < 1e-12);
        assert_eq!(SafeProduct::<f64>::zero(4).value(), 0.0);
        assert_eq!(SafeProduct::<f64>::one(0).value(), 1.0);
    }
}
