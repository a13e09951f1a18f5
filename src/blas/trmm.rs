use super::{Orientation, Side, UnitOrNonUnit, UpperOrLower, gemm, make_triangular, set_diagonal, to_mc_mr};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::Result;

/// `B = α op(A) B` (left) or `B = α B op(A)` (right) with `A` triangular
///
/// Only the `uplo` triangle of `A` is referenced. The triangle is copied out
/// and the product is an ordinary [`gemm`].
pub fn trmm<T, A, B>(
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

    let mut tri = to_mc_mr(a, Orientation::Normal)?;
    make_triangular(uplo, &mut tri);
    if diag == UnitOrNonUnit::Unit {
        set_diagonal(&mut tri, T::one(), 0);
    }
    let rhs = to_mc_mr(&*b, Orientation::Normal)?;
    let mut out = DistMatrix::with_shape(b.grid(), Dist::Mc, Dist::Mr, b.height(), b.width());
    match side {
        Side::Left => gemm(orient, Orientation::Normal, alpha, &tri, &rhs, T::zero(), &mut out)?,
        Side::Right => gemm(Orientation::Normal, orient, alpha, &rhs, &tri, T::zero(), &mut out)?,
    }
    b.as_view_mut().assign(&out)
}
