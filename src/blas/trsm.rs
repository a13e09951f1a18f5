//! Distributed triangular solves
//!
//! The left, non-transposed cases are solved directly by a blocked sweep;
//! every other case is rewritten into one of them through an explicit
//! (conjugate) transpose.

use super::{Orientation, Side, UnitOrNonUnit, UpperOrLower, conjugate, local, to_mc_mr};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::Result;
use crate::matrix::{MatrixMut, MatrixRef};
use crate::redist;
use std::sync::Arc;

/// Solve `op(A) X = α B` (left) or `X op(A) = α B` (right), overwriting `B`
///
/// Only the `uplo` triangle of `A` is referenced.
pub fn trsm<T, A, B>(
    side: Side,
    uplo: UpperOrLower,
    orient: Orientation,
    diag: UnitOrNonUnit,
    alpha: T,
    a: &A,
    b: &mut B,
) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let n = match side {
        Side::Left => b.height(),
        Side::Right => b.width(),
    };
    assert!(
        a.height() == n && a.width() == n,
        "triangular operand is {}x{}, expected {n}x{n}",
        a.height(),
        a.width()
    );
    if !b.grid().in_grid() {
        return Ok(());
    }

    if b.meta().pair() != (Dist::Mc, Dist::Mr) {
        let mut tmp = to_mc_mr(&*b, Orientation::Normal)?;
        trsm(side, uplo, orient, diag, alpha, a, &mut tmp)?;
        return b.as_view_mut().assign(&tmp);
    }

    match side {
        Side::Left => {
            let (op_a, op_uplo) = if orient == Orientation::Normal {
                (to_mc_mr(a, Orientation::Normal)?, uplo)
            } else {
                (to_mc_mr(a, orient)?, uplo.flip())
            };
            local::scale(alpha, b.local_mut());
            left_blocked(op_uplo, &op_a, b, |a11, b1| {
                local::trsm(Side::Left, op_uplo, Orientation::Normal, diag, T::one(), a11, b1)
            })
        }
        Side::Right => {
            // X op(A) = αB  <=>  op(A)ᵀ Xᵀ = αBᵀ
            let (m, m_uplo) = match orient {
                Orientation::Normal => (to_mc_mr(a, Orientation::Transpose)?, uplo.flip()),
                Orientation::Transpose => (to_mc_mr(a, Orientation::Normal)?, uplo),
                Orientation::Adjoint => {
                    let mut m = to_mc_mr(a, Orientation::Normal)?;
                    conjugate(&mut m);
                    (m, uplo)
                }
            };
            let mut bt = redist::transpose(&*b, Dist::Mc, Dist::Mr)?;
            local::scale(alpha, bt.local_mut());
            left_blocked(m_uplo, &m, &mut bt, |a11, b1| {
                local::trsm(Side::Left, m_uplo, Orientation::Normal, diag, T::one(), a11, b1)
            })?;
            let x = redist::transpose(&bt, Dist::Mc, Dist::Mr)?;
            b.as_view_mut().assign(&x)
        }
    }
}

/// Blocked left solve with the `uplo` triangle of the `[MC,MR]` matrix `a`
///
/// `solve` handles one diagonal block: it receives the replicated block of
/// `a` and the `[STAR,MR]` rows of `b` it must overwrite. The rows still to
/// be solved are then updated with a local product.
pub(crate) fn left_blocked<T, A, B, F>(uplo: UpperOrLower, a: &A, b: &mut B, mut solve: F) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
    F: FnMut(MatrixRef<'_, T>, MatrixMut<'_, T>),
{
    let grid = Arc::clone(b.grid());
    let (m, n) = (b.height(), b.width());
    let nb = grid.block_size().max(1);
    let mut starts: Vec<usize> = (0..m).step_by(nb).collect();
    if uplo == UpperOrLower::Upper {
        starts.reverse();
    }

    for kk in starts {
        let kb = nb.min(m - kk);

        let mut a11 = DistMatrix::new(&grid, Dist::Star, Dist::Star);
        a11.assign(&a.view(kk, kk, kb, kb))?;
        let mut b1 = DistMatrix::new(&grid, Dist::Star, Dist::Mr);
        b1.align_with(b.meta());
        b1.assign(&b.view(kk, 0, kb, n))?;

        solve(a11.local(), b1.local_mut());
        b.view_mut(kk, 0, kb, n).assign(&b1)?;

        let (start, len) = match uplo {
            UpperOrLower::Lower => (kk + kb, m - kk - kb),
            UpperOrLower::Upper => (0, kk),
        };
        if len == 0 {
            continue;
        }
        let mut rest = b.view_mut(start, 0, len, n);
        let mut a_off = DistMatrix::new(&grid, Dist::Mc, Dist::Star);
        a_off.align_with(rest.meta());
        a_off.assign(&a.view(start, kk, len, kb))?;
        local::gemm(
            Orientation::Normal,
            Orientation::Normal,
            -T::one(),
            a_off.local(),
            b1.local(),
            T::one(),
            rest.local_mut(),
        );
    }
    Ok(())
}
