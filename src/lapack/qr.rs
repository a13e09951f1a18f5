//! Householder QR: `A = Q R`
//!
//! `Q = H₀ H₁ ⋯ H_{k-1}` with `k = min(m, n)`. The vectors of the reflectors
//! are stored below the diagonal of `A`, `R` on and above it, and the scalars
//! `τ` in a separate `[MD,STAR]` vector aligned with `A`'s diagonal.

use super::householder::{Stored, apply_from_left, apply_from_right, householder_vector, reflect_column, sweep};
use super::in_mc_mr;
use crate::blas::{Orientation, Side};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::{Error, Result};

/// Overwrite `A` with its QR factorization and return `τ`
pub fn qr<T, A>(a: &mut A) -> Result<DistMatrix<T>>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| qr(tmp));
    }
    let (m, n) = (a.height(), a.width());
    let k = m.min(n);
    let mut t = DistMatrix::new(a.grid(), Dist::Md, Dist::Star);
    t.align_with_diagonal(a.meta(), 0);
    t.resize(k, 1);
    if !a.grid().in_grid() {
        return Ok(t);
    }

    for s in 0..k {
        let tau = reflect_column(a, s, s)?;
        t.set(s, 0, tau);
        if s + 1 < n {
            let u = {
                let rest = a.view(s, s + 1, m - s, n - s - 1);
                householder_vector(&*a, Stored::Column { i: s, j: s, len: m - s }, Dist::Mc, &rest)?
            };
            apply_from_left(tau.conj(), &u, &mut a.view_mut(s, s + 1, m - s, n - s - 1))?;
        }
    }
    Ok(t)
}

/// `B = op(Q) B` (left) or `B = B op(Q)` (right) with `Q` from [`qr`]
///
/// `orient` may be `Normal` or `Adjoint`; `Transpose` is only accepted for
/// real scalars, where it means the same as `Adjoint`.
pub fn qr_apply_q<T, A, D, B>(side: Side, orient: Orientation, a: &A, t: &D, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    D: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let adjoint = is_adjoint::<T>(orient)?;
    let m = a.height();
    let k = t.height();
    assert!(k <= m.min(a.width()), "more reflectors than the factored matrix holds");
    match side {
        Side::Left => assert_eq!(b.height(), m, "Q is {m}x{m} but B has {} rows", b.height()),
        Side::Right => assert_eq!(b.width(), m, "Q is {m}x{m} but B has {} columns", b.width()),
    }
    if !b.grid().in_grid() {
        return Ok(());
    }
    if b.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(b, |tmp| qr_apply_q(side, orient, a, t, tmp));
    }
    let taus = t.to_matrix()?;

    // Q = H₀ ⋯ H_{k-1}, Qᴴ = H_{k-1}ᴴ ⋯ H₀ᴴ
    let ascending = matches!((side, adjoint), (Side::Left, true) | (Side::Right, false));
    let width = match side {
        Side::Left => b.width(),
        Side::Right => b.height(),
    };
    for s in sweep(k, ascending) {
        let tau = if adjoint { taus.get(s, 0).conj() } else { taus.get(s, 0) };
        let stored = Stored::Column { i: s, j: s, len: m - s };
        match side {
            Side::Left => {
                let mut rows = b.view_mut(s, 0, m - s, width);
                let u = householder_vector(a, stored, Dist::Mc, &rows)?;
                apply_from_left(tau, &u, &mut rows)?;
            }
            Side::Right => {
                let mut cols = b.view_mut(0, s, width, m - s);
                let u = householder_vector(a, stored, Dist::Mr, &cols)?;
                apply_from_right(tau, &u, &mut cols)?;
            }
        }
    }
    Ok(())
}

/// Whether `orient` asks for `Qᴴ`
pub(crate) fn is_adjoint<T: Field>(orient: Orientation) -> Result<bool> {
    match orient {
        Orientation::Normal => Ok(false),
        Orientation::Adjoint => Ok(true),
        Orientation::Transpose if !T::IS_COMPLEX => Ok(true),
        Orientation::Transpose => Err(Error::NotImplemented {
            feature: "applying the transpose of a complex Householder product",
        }),
    }
}
