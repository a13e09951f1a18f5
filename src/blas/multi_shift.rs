use super::trsm::left_blocked;
use super::{Orientation, Side, UpperOrLower, conjugate, local, to_mc_mr};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::{Error, Result};

/// Solve `op(U - σⱼ I) xⱼ = α bⱼ` for every column `j` of `X`, in place
///
/// `shifts` is a column vector with one shift per column of `X`, in any
/// layout. For `Adjoint` the shifts enter conjugated, since
/// `(U - σI)ᴴ = Uᴴ - σ̄I`. Only left-sided solves are supported.
pub fn multi_shift_trsm<T, U, S, X>(
    side: Side,
    uplo: UpperOrLower,
    orient: Orientation,
    alpha: T,
    u: &U,
    shifts: &S,
    x: &mut X,
) -> Result<()>
where
    T: Field,
    U: DistRead<T> + ?Sized,
    S: DistRead<T> + ?Sized,
    X: DistWrite<T> + ?Sized,
{
    if side == Side::Right {
        return Err(Error::NotImplemented {
            feature: "right-sided multi-shift triangular solves",
        });
    }
    let n = x.height();
    assert!(
        u.height() == n && u.width() == n,
        "triangular operand is {}x{}, expected {n}x{n}",
        u.height(),
        u.width()
    );
    assert_eq!(
        (shifts.height(), shifts.width()),
        (x.width(), 1),
        "one shift per right-hand side"
    );
    if !x.grid().in_grid() {
        return Ok(());
    }

    if x.meta().pair() != (Dist::Mc, Dist::Mr) {
        let mut tmp = to_mc_mr(&*x, Orientation::Normal)?;
        multi_shift_trsm(side, uplo, orient, alpha, u, shifts, &mut tmp)?;
        return x.as_view_mut().assign(&tmp);
    }

    let (op_u, op_uplo) = if orient == Orientation::Normal {
        (to_mc_mr(u, Orientation::Normal)?, uplo)
    } else {
        (to_mc_mr(u, orient)?, uplo.flip())
    };

    // One shift per local column of X
    let mut local_shifts = DistMatrix::new(x.grid(), Dist::Mr, Dist::Star);
    local_shifts.align_cols(x.meta().row_align());
    local_shifts.assign(shifts)?;
    if orient == Orientation::Adjoint {
        conjugate(&mut local_shifts);
    }
    let sigma = local_shifts.local().col(0).to_vec();

    local::scale(alpha, x.local_mut());
    left_blocked(op_uplo, &op_u, x, |u11, x1| {
        local::multi_shift_trsm(op_uplo, u11, &sigma, x1)
    })
}
