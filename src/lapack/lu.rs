//! LU factorization with partial or full pivoting
//!
//! Pivots are recorded as a swap sequence: at step `k` row `k` was exchanged
//! with row `p[k]` (and, for full pivoting, column `k` with column `q[k]`).
//! The sequences live in `[VC,STAR]` integer vectors.

use super::{in_mc_mr, rank_one_update, row_values, spread, window_meta};
use crate::blas::{Orientation, Side, UnitOrNonUnit, UpperOrLower, column_swap, local, max_abs_loc, row_swap, trsm};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::{Element, Field};
use crate::error::{Error, Result};

/// Overwrite `A` with `L` and `U` such that `P A = L U`
///
/// `L` is unit lower trapezoidal, stored below the diagonal. Fails with
/// [`Error::SingularPivot`] when a whole pivot column is exactly zero; `A`
/// then holds the partial factorization.
pub fn lu<T, A>(a: &mut A) -> Result<DistMatrix<i64>>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| lu(tmp));
    }
    let (m, n) = (a.height(), a.width());
    let k_max = m.min(n);
    let mut p = DistMatrix::with_shape(a.grid(), Dist::Vc, Dist::Star, k_max, 1);
    if !a.grid().in_grid() {
        return Ok(p);
    }

    for k in 0..k_max {
        let pivot = max_abs_loc(&a.view(k, k, m - k, 1))?;
        if pivot.value == <T::Real as Element>::zero() {
            return Err(Error::SingularPivot { index: k });
        }
        let row = k + pivot.i;
        p.set(k, 0, row as i64);
        row_swap(a, k, row)?;
        eliminate(a, k)?;
    }
    Ok(p)
}

/// Overwrite `A` with `L` and `U` such that `P A Qᵀ = L U`
///
/// Each step pivots on the largest entry of the whole trailing matrix.
/// Returns the row and column swap sequences.
pub fn lu_full<T, A>(a: &mut A) -> Result<(DistMatrix<i64>, DistMatrix<i64>)>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| lu_full(tmp));
    }
    let (m, n) = (a.height(), a.width());
    let k_max = m.min(n);
    let mut p = DistMatrix::with_shape(a.grid(), Dist::Vc, Dist::Star, k_max, 1);
    let mut q = DistMatrix::with_shape(a.grid(), Dist::Vc, Dist::Star, k_max, 1);
    if !a.grid().in_grid() {
        return Ok((p, q));
    }

    for k in 0..k_max {
        let pivot = max_abs_loc(&a.view(k, k, m - k, n - k))?;
        if pivot.value == <T::Real as Element>::zero() {
            return Err(Error::SingularPivot { index: k });
        }
        let (row, col) = (k + pivot.i, k + pivot.j);
        p.set(k, 0, row as i64);
        q.set(k, 0, col as i64);
        row_swap(a, k, row)?;
        column_swap(a, k, col)?;
        eliminate(a, k)?;
    }
    Ok((p, q))
}

/// One elimination step around the pivot at (k, k)
fn eliminate<T, A>(a: &mut A, k: usize) -> Result<()>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let (m, n) = (a.height(), a.width());
    let below = m - k - 1;
    let right = n - k - 1;
    let pivot = a.get(k, k)?;
    local::scale(T::one() / pivot, a.view_mut(k + 1, k, below, 1).local_mut());
    if below == 0 || right == 0 {
        return Ok(());
    }
    let trailing = window_meta(a.meta(), k + 1, k + 1, below, right);
    let l21 = spread(&a.view(k + 1, k, below, 1), Dist::Mc, Dist::Star, &trailing)?;
    let u12 = spread(&a.view(k, k + 1, 1, right), Dist::Star, Dist::Mr, &trailing)?;
    rank_one_update(
        -T::one(),
        &l21,
        &row_values(&u12),
        &mut a.view_mut(k + 1, k + 1, below, right),
        None,
    );
    Ok(())
}

/// Apply the swap sequence `p` to the rows of `B`, forwards or in reverse
pub(crate) fn apply_row_pivots<T, B, P>(b: &mut B, p: &P, reverse: bool) -> Result<()>
where
    T: Element,
    B: DistWrite<T> + ?Sized,
    P: DistRead<i64> + ?Sized,
{
    let swaps = p.to_matrix()?;
    let steps: Vec<usize> = if reverse {
        (0..swaps.height()).rev().collect()
    } else {
        (0..swaps.height()).collect()
    };
    for k in steps {
        row_swap(b, k, swaps.get(k, 0) as usize)?;
    }
    Ok(())
}

/// Solve `op(A) X = B` in place of `B` using the factors from [`lu`]
pub fn lu_solve_after<T, A, P, B>(orient: Orientation, a: &A, p: &P, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    P: DistRead<i64> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let n = a.height();
    assert_eq!(a.width(), n, "solving needs a square factorization");
    assert_eq!(b.height(), n, "right-hand side has {} rows, expected {n}", b.height());
    if orient == Orientation::Normal {
        // A = Pᵀ L U
        apply_row_pivots(b, p, false)?;
        trsm(Side::Left, UpperOrLower::Lower, orient, UnitOrNonUnit::Unit, T::one(), a, b)?;
        trsm(Side::Left, UpperOrLower::Upper, orient, UnitOrNonUnit::NonUnit, T::one(), a, b)
    } else {
        // op(A) = op(U) op(L) P
        trsm(Side::Left, UpperOrLower::Upper, orient, UnitOrNonUnit::NonUnit, T::one(), a, b)?;
        trsm(Side::Left, UpperOrLower::Lower, orient, UnitOrNonUnit::Unit, T::one(), a, b)?;
        apply_row_pivots(b, p, true)
    }
}

/// Solve `A X = B` in place of `B`; `A` is overwritten by its factors
pub fn lu_solve<T, A, B>(a: &mut A, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let p = lu(a)?;
    lu_solve_after(Orientation::Normal, &*a, &p, b)
}
