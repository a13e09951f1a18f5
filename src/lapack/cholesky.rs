//! Cholesky factorization of Hermitian positive definite matrices

use super::{in_mc_mr, rank_one_update, row_values, spread, spread_transposed, window_meta};
use crate::blas::{Orientation, Side, UnitOrNonUnit, UpperOrLower, local, trsm};
use crate::dist::Dist;
use crate::dist_matrix::{DistRead, DistWrite};
use crate::dtype::{Element, Field, RealField};
use crate::error::{Error, Result};

/// Overwrite the `uplo` triangle of `A` with `L` (`A = L Lᴴ`) or `U`
/// (`A = Uᴴ U`)
///
/// Only the `uplo` triangle is read or written. A diagonal entry that is
/// not strictly positive (or NaN) fails with
/// [`Error::NotPositiveDefinite`].
pub fn cholesky<T, A>(uplo: UpperOrLower, a: &mut A) -> Result<()>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let n = a.height();
    assert_eq!(a.width(), n, "Cholesky needs a square matrix, got {n}x{}", a.width());
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| cholesky(uplo, tmp));
    }
    if !a.grid().in_grid() {
        return Ok(());
    }

    let zero = <T::Real as Element>::zero();
    for k in 0..n {
        let delta = a.get(k, k)?.real_part();
        if delta.is_nan_val() || delta <= zero {
            return Err(Error::NotPositiveDefinite { index: k });
        }
        let root = delta.sqrt_val();
        a.set(k, k, T::from_real(root));
        let rest = n - k - 1;
        if rest == 0 {
            break;
        }
        let inv = T::from_real(<T::Real as Element>::one() / root);
        let trailing = window_meta(a.meta(), k + 1, k + 1, rest, rest);
        let (x, y) = match uplo {
            UpperOrLower::Lower => {
                local::scale(inv, a.view_mut(k + 1, k, rest, 1).local_mut());
                let col = a.view(k + 1, k, rest, 1);
                (
                    spread(&col, Dist::Mc, Dist::Star, &trailing)?,
                    spread_transposed(&col, Dist::Star, Dist::Mr, &trailing, true)?,
                )
            }
            UpperOrLower::Upper => {
                local::scale(inv, a.view_mut(k, k + 1, 1, rest).local_mut());
                let row = a.view(k, k + 1, 1, rest);
                (
                    spread_transposed(&row, Dist::Mc, Dist::Star, &trailing, true)?,
                    spread(&row, Dist::Star, Dist::Mr, &trailing)?,
                )
            }
        };
        rank_one_update(
            -T::one(),
            &x,
            &row_values(&y),
            &mut a.view_mut(k + 1, k + 1, rest, rest),
            Some(uplo),
        );
    }
    Ok(())
}

/// Solve `A X = B` in place of `B` given the factor from [`cholesky`]
pub fn cholesky_solve_after<T, A, B>(uplo: UpperOrLower, a: &A, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let (first, second) = match uplo {
        UpperOrLower::Lower => (Orientation::Normal, Orientation::Adjoint),
        UpperOrLower::Upper => (Orientation::Adjoint, Orientation::Normal),
    };
    trsm(Side::Left, uplo, first, UnitOrNonUnit::NonUnit, T::one(), a, b)?;
    trsm(Side::Left, uplo, second, UnitOrNonUnit::NonUnit, T::one(), a, b)
}
