//! Unpivoted `L D Lᵀ` and `L D Lᴴ` factorizations

use super::{in_mc_mr, rank_one_update, row_values, spread, spread_transposed, window_meta};
use crate::blas::{Orientation, Side, UnitOrNonUnit, UpperOrLower, diagonal_scale, local, trmm, trsm};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::{Error, Result};

fn orientation(conjugate: bool) -> Orientation {
    if conjugate { Orientation::Adjoint } else { Orientation::Transpose }
}

/// Overwrite the lower triangle of `A` with the unit lower `L` and the
/// diagonal `D` of `A = L D Lᴴ` (`conjugate`) or `A = L D Lᵀ`
///
/// Returns `D` as an `[MD,STAR]` vector aligned with `A`'s diagonal. With
/// `conjugate` the diagonal is taken to be real. A zero pivot fails with
/// [`Error::SingularPivot`].
pub fn ldl<T, A>(conjugate: bool, a: &mut A) -> Result<DistMatrix<T>>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let n = a.height();
    assert_eq!(a.width(), n, "LDL needs a square matrix, got {n}x{}", a.width());
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| ldl(conjugate, tmp));
    }
    if !a.grid().in_grid() {
        return a.get_diagonal(0);
    }

    for k in 0..n {
        let mut delta = a.get(k, k)?;
        if conjugate {
            delta = T::from_real(delta.real_part());
        }
        if delta == T::zero() {
            return Err(Error::SingularPivot { index: k });
        }
        a.set(k, k, delta);
        let rest = n - k - 1;
        if rest == 0 {
            break;
        }
        let trailing = window_meta(a.meta(), k + 1, k + 1, rest, rest);
        let (x, y) = {
            let col = a.view(k + 1, k, rest, 1);
            (
                spread(&col, Dist::Mc, Dist::Star, &trailing)?,
                spread_transposed(&col, Dist::Star, Dist::Mr, &trailing, conjugate)?,
            )
        };
        let inv = T::one() / delta;
        rank_one_update(
            -inv,
            &x,
            &row_values(&y),
            &mut a.view_mut(k + 1, k + 1, rest, rest),
            Some(UpperOrLower::Lower),
        );
        local::scale(inv, a.view_mut(k + 1, k, rest, 1).local_mut());
    }
    a.get_diagonal(0)
}

/// `B = A B` where `A = L D Lᴴ` (or `L D Lᵀ`) was factored by [`ldl`]
pub fn ldl_multiply_after<T, A, D, B>(conjugate: bool, a: &A, d: &D, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    D: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let lower = UpperOrLower::Lower;
    trmm(Side::Left, lower, orientation(conjugate), UnitOrNonUnit::Unit, T::one(), a, b)?;
    diagonal_scale(Side::Left, Orientation::Normal, d, b)?;
    trmm(Side::Left, lower, Orientation::Normal, UnitOrNonUnit::Unit, T::one(), a, b)
}

/// Solve `A X = B` in place of `B` with the factors from [`ldl`]
pub fn ldl_solve_after<T, A, D, B>(conjugate: bool, a: &A, d: &D, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    D: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let lower = UpperOrLower::Lower;
    trsm(Side::Left, lower, Orientation::Normal, UnitOrNonUnit::Unit, T::one(), a, b)?;
    let mut inv = d.to_star_star()?;
    {
        let mut entries = inv.local_mut();
        for i in 0..entries.height() {
            let v = entries.get(i, 0);
            entries.set(i, 0, T::one() / v);
        }
    }
    diagonal_scale(Side::Left, Orientation::Normal, &inv, b)?;
    trsm(Side::Left, lower, orientation(conjugate), UnitOrNonUnit::Unit, T::one(), a, b)
}
