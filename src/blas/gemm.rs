//! Distributed matrix-matrix product
//!
//! Stationary-C variant: `C` stays where it is while panels of `op(A)` and
//! `op(B)` of width `nb` are spread across the mesh rows and columns that
//! need them, after which every process runs one local rank-`nb` update.

use super::{Orientation, local, to_mc_mr};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::Result;
use std::sync::Arc;

/// `C = α op(A) op(B) + β C`
///
/// `A` and `B` may be in any layout. `C` is updated in place of its own
/// layout; if that is not `[MC,MR]` the product is formed in a temporary and
/// copied back. With `β = 0` the old contents of `C` are ignored.
pub fn gemm<T, A, B, C>(
    orient_a: Orientation,
    orient_b: Orientation,
    alpha: T,
    a: &A,
    b: &B,
    beta: T,
    c: &mut C,
) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    B: DistRead<T> + ?Sized,
    C: DistWrite<T> + ?Sized,
{
    let (m, n) = (c.height(), c.width());
    let (am, k) = op_shape(a.height(), a.width(), orient_a);
    let (bk, bn) = op_shape(b.height(), b.width(), orient_b);
    assert!(
        am == m && bk == k && bn == n,
        "nonconformant gemm: op(A) is {am}x{k}, op(B) is {bk}x{bn}, C is {m}x{n}"
    );
    assert!(
        **a.grid() == **c.grid() && **b.grid() == **c.grid(),
        "gemm operands live on different grids"
    );
    let grid = Arc::clone(c.grid());
    if !grid.in_grid() {
        return Ok(());
    }

    if c.meta().pair() != (Dist::Mc, Dist::Mr) {
        let mut tmp = to_mc_mr(&*c, Orientation::Normal)?;
        gemm(orient_a, orient_b, alpha, a, b, beta, &mut tmp)?;
        return c.as_view_mut().assign(&tmp);
    }

    if beta == T::zero() {
        c.local_mut().fill(T::zero());
    } else {
        local::scale(beta, c.local_mut());
    }
    if k == 0 || alpha == T::zero() {
        return Ok(());
    }

    let op_a = to_mc_mr(a, orient_a)?;
    let op_b = to_mc_mr(b, orient_b)?;
    let nb = grid.block_size().max(1);
    tracing::trace!(m, n, k, nb, "gemm");

    for kk in (0..k).step_by(nb) {
        let kb = nb.min(k - kk);

        let mut a1 = DistMatrix::new(&grid, Dist::Mc, Dist::Star);
        a1.align_with(c.meta());
        a1.assign(&op_a.view(0, kk, m, kb))?;

        let mut b1 = DistMatrix::new(&grid, Dist::Star, Dist::Mr);
        b1.align_with(c.meta());
        b1.assign(&op_b.view(kk, 0, kb, n))?;

        local::gemm(
            Orientation::Normal,
            Orientation::Normal,
            alpha,
            a1.local(),
            b1.local(),
            T::one(),
            c.local_mut(),
        );
    }
    Ok(())
}

fn op_shape(height: usize, width: usize, orient: Orientation) -> (usize, usize) {
    if orient.is_transposed() {
        (width, height)
    } else {
        (height, width)
    }
}
