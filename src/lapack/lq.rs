//! Householder LQ: `A = L Q`
//!
//! `Q = H_{k-1}ᴴ ⋯ H₀ᴴ` with `k = min(m, n)`. Reflector `s` zeroes row `s`
//! right of the diagonal; the conjugate of its vector is stored there.

use super::householder::{Stored, apply_from_left, apply_from_right, householder_vector, reflect_row, sweep};
use super::in_mc_mr;
use super::qr::is_adjoint;
use crate::blas::{Orientation, Side};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::Result;

/// Overwrite `A` with its LQ factorization and return `τ`
///
/// `L` ends up on and below the diagonal.
pub fn lq<T, A>(a: &mut A) -> Result<DistMatrix<T>>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| lq(tmp));
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
        let tau = reflect_row(a, s, s, n - s, 0)?;
        t.set(s, 0, tau);
        if s + 1 < m {
            let stored = Stored::Row { i: s, j: s, len: n - s, unit: 0 };
            let u = {
                let below = a.view(s + 1, s, m - s - 1, n - s);
                householder_vector(&*a, stored, Dist::Mr, &below)?
            };
            apply_from_right(tau, &u, &mut a.view_mut(s + 1, s, m - s - 1, n - s))?;
        }
    }
    Ok(t)
}

/// `B = op(Q) B` (left) or `B = B op(Q)` (right) with `Q` from [`lq`]
///
/// See [`qr_apply_q`](super::qr_apply_q) for the accepted orientations.
pub fn lq_apply_q<T, A, D, B>(side: Side, orient: Orientation, a: &A, t: &D, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    D: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let adjoint = is_adjoint::<T>(orient)?;
    let n = a.width();
    let k = t.height();
    assert!(k <= n.min(a.height()), "more reflectors than the factored matrix holds");
    match side {
        Side::Left => assert_eq!(b.height(), n, "Q is {n}x{n} but B has {} rows", b.height()),
        Side::Right => assert_eq!(b.width(), n, "Q is {n}x{n} but B has {} columns", b.width()),
    }
    if !b.grid().in_grid() {
        return Ok(());
    }
    if b.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(b, |tmp| lq_apply_q(side, orient, a, t, tmp));
    }
    let taus = t.to_matrix()?;

    // Q = H_{k-1}ᴴ ⋯ H₀ᴴ, Qᴴ = H₀ ⋯ H_{k-1}
    let ascending = matches!((side, adjoint), (Side::Left, false) | (Side::Right, true));
    let width = match side {
        Side::Left => b.width(),
        Side::Right => b.height(),
    };
    for s in sweep(k, ascending) {
        let tau = if adjoint { taus.get(s, 0) } else { taus.get(s, 0).conj() };
        let stored = Stored::Row { i: s, j: s, len: n - s, unit: 0 };
        match side {
            Side::Left => {
                let mut rows = b.view_mut(s, 0, n - s, width);
                let u = householder_vector(a, stored, Dist::Mc, &rows)?;
                apply_from_left(tau, &u, &mut rows)?;
            }
            Side::Right => {
                let mut cols = b.view_mut(0, s, width, n - s);
                let u = householder_vector(a, stored, Dist::Mr, &cols)?;
                apply_from_right(tau, &u, &mut cols)?;
            }
        }
    }
    Ok(())
}
