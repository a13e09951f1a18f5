//! Householder RQ: `A = R Q`
//!
//! With `k = min(m, n)`, reflector `s` zeroes row `m - k + s` left of column
//! `n - k + s`, working from the last row upwards, and
//! `Q = H₀ᴴ H₁ᴴ ⋯ H_{k-1}ᴴ`. `R` is the upper trapezoid that ends on the
//! `n - m` diagonal; `τ` is aligned with that diagonal.

use super::householder::{Stored, apply_from_left, apply_from_right, householder_vector, reflect_row, sweep};
use super::in_mc_mr;
use super::qr::is_adjoint;
use crate::blas::{Orientation, Side};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::Field;
use crate::error::Result;

fn stored(a_width: usize, k: usize, row: usize, s: usize) -> Stored {
    let pivot = a_width - k + s;
    Stored::Row {
        i: row,
        j: 0,
        len: pivot + 1,
        unit: pivot,
    }
}

/// Overwrite `A` with its RQ factorization and return `τ`
pub fn rq<T, A>(a: &mut A) -> Result<DistMatrix<T>>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    if a.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(a, |tmp| rq(tmp));
    }
    let (m, n) = (a.height(), a.width());
    let k = m.min(n);
    let mut t = DistMatrix::new(a.grid(), Dist::Md, Dist::Star);
    t.align_with_diagonal(a.meta(), n as isize - m as isize);
    t.resize(k, 1);
    if !a.grid().in_grid() {
        return Ok(t);
    }

    for s in (0..k).rev() {
        let (ki, kj) = (m - k + s, n - k + s);
        let tau = reflect_row(a, ki, 0, kj + 1, kj)?;
        t.set(s, 0, tau);
        if ki > 0 {
            let u = {
                let above = a.view(0, 0, ki, kj + 1);
                householder_vector(&*a, stored(n, k, ki, s), Dist::Mr, &above)?
            };
            apply_from_right(tau, &u, &mut a.view_mut(0, 0, ki, kj + 1))?;
        }
    }
    Ok(t)
}

/// `B = op(Q) B` (left) or `B = B op(Q)` (right) with `Q` from [`rq`]
///
/// See [`qr_apply_q`](super::qr_apply_q) for the accepted orientations.
pub fn rq_apply_q<T, A, D, B>(side: Side, orient: Orientation, a: &A, t: &D, b: &mut B) -> Result<()>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    D: DistRead<T> + ?Sized,
    B: DistWrite<T> + ?Sized,
{
    let adjoint = is_adjoint::<T>(orient)?;
    let (m, n) = (a.height(), a.width());
    let k = t.height();
    assert_eq!(k, m.min(n), "RQ needs one reflector per row of the shorter dimension");
    match side {
        Side::Left => assert_eq!(b.height(), n, "Q is {n}x{n} but B has {} rows", b.height()),
        Side::Right => assert_eq!(b.width(), n, "Q is {n}x{n} but B has {} columns", b.width()),
    }
    if !b.grid().in_grid() {
        return Ok(());
    }
    if b.meta().pair() != (Dist::Mc, Dist::Mr) {
        return in_mc_mr(b, |tmp| rq_apply_q(side, orient, a, t, tmp));
    }
    let taus = t.to_matrix()?;

    // Q = H₀ᴴ ⋯ H_{k-1}ᴴ, Qᴴ = H_{k-1} ⋯ H₀
    let ascending = matches!((side, adjoint), (Side::Left, true) | (Side::Right, false));
    let width = match side {
        Side::Left => b.width(),
        Side::Right => b.height(),
    };
    for s in sweep(k, ascending) {
        let tau = if adjoint { taus.get(s, 0) } else { taus.get(s, 0).conj() };
        let len = n - k + s + 1;
        let vector = stored(n, k, m - k + s, s);
        match side {
            Side::Left => {
                let mut rows = b.view_mut(0, 0, len, width);
                let u = householder_vector(a, vector, Dist::Mc, &rows)?;
                apply_from_left(tau, &u, &mut rows)?;
            }
            Side::Right => {
                let mut cols = b.view_mut(0, 0, width, len);
                let u = householder_vector(a, vector, Dist::Mr, &cols)?;
                apply_from_right(tau, &u, &mut cols)?;
            }
        }
    }
    Ok(())
}
