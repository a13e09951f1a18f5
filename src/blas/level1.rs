//! Level-1 style distributed utilities
//!
//! Most of these only touch the entries a process holds. Replicated copies
//! stay consistent because every holder applies the same update.

use super::local;
use super::{Orientation, Side, UpperOrLower};
use crate::dist::{Dist, DistMeta};
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite, diagonal_entry, diagonal_length};
use crate::dtype::{Element, Field, RealField};
use crate::error::Result;
use crate::grid::CommKind;
use crate::redist;

/// `A = α A`
pub fn scale<T: Field, A: DistWrite<T> + ?Sized>(alpha: T, a: &mut A) {
    local::scale(alpha, a.local_mut());
}

/// `Y = α X + Y`
///
/// `X` is redistributed into `Y`'s exact layout first unless they already
/// agree.
pub fn axpy<T: Field, X, Y>(alpha: T, x: &X, y: &mut Y) -> Result<()>
where
    X: DistRead<T> + ?Sized,
    Y: DistWrite<T> + ?Sized,
{
    assert_eq!(
        (x.height(), x.width()),
        (y.height(), y.width()),
        "axpy of differently shaped matrices"
    );
    let moved;
    let xl = if x.meta().same_layout(y.meta()) {
        x.local()
    } else {
        let mut m = DistMatrix::aligned_like(y.meta());
        m.assign(x)?;
        moved = m;
        moved.local()
    };
    let mut yl = y.local_mut();
    for j in 0..yl.width() {
        for i in 0..yl.height() {
            yl.update(i, j, alpha * xl.get(i, j));
        }
    }
    Ok(())
}

/// Replace every entry by its complex conjugate
pub fn conjugate<T: Field, A: DistWrite<T> + ?Sized>(a: &mut A) {
    if !T::IS_COMPLEX {
        return;
    }
    let mut local = a.local_mut();
    for j in 0..local.width() {
        for v in local.col_mut(j) {
            *v = v.conj();
        }
    }
}

/// Set every entry to zero
pub fn zero<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A) {
    a.local_mut().fill(T::zero());
}

/// Set every entry to `value`
pub fn fill<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A, value: T) {
    a.local_mut().fill(value);
}

/// Visit the local entries of `meta` as `(il, jl, i, j)`
fn for_each_local(meta: &DistMeta, mut f: impl FnMut(usize, usize, usize, usize)) {
    let (rows, cols) = meta.my_spans();
    for jl in 0..cols.len {
        let j = cols.global(jl);
        for il in 0..rows.len {
            f(il, jl, rows.global(il), j);
        }
    }
}

/// Zero everything outside the trapezoid bounded by the `offset` diagonal
///
/// `Lower` keeps the entries with `j - i <= offset`, `Upper` keeps those
/// with `j - i >= offset`. Local.
pub fn make_trapezoidal<T: Element, A: DistWrite<T> + ?Sized>(uplo: UpperOrLower, a: &mut A, offset: isize) {
    let meta = a.meta().clone();
    let mut local = a.local_mut();
    for_each_local(&meta, |il, jl, i, j| {
        let band = j as isize - i as isize;
        let keep = match uplo {
            UpperOrLower::Lower => band <= offset,
            UpperOrLower::Upper => band >= offset,
        };
        if !keep {
            local.set(il, jl, T::zero());
        }
    });
}

/// Zero the strictly opposite triangle; local
pub fn make_triangular<T: Element, A: DistWrite<T> + ?Sized>(uplo: UpperOrLower, a: &mut A) {
    make_trapezoidal(uplo, a, 0);
}

/// Overwrite the triangle opposite `uplo` with the conjugate transpose of
/// the `uplo` triangle and make the diagonal real
pub fn make_hermitian<T: Field, A: DistWrite<T> + ?Sized>(uplo: UpperOrLower, a: &mut A) -> Result<()> {
    assert_eq!(a.height(), a.width(), "make_hermitian needs a square matrix");
    let meta = a.meta().clone();
    let mut adjoint = DistMatrix::aligned_like(&meta);
    redist::transpose_into(&*a, &mut adjoint, true)?;
    let mirrored = adjoint.local();
    let mut local = a.local_mut();
    for_each_local(&meta, |il, jl, i, j| {
        let opposite = match uplo {
            UpperOrLower::Lower => j > i,
            UpperOrLower::Upper => j < i,
        };
        if opposite {
            local.set(il, jl, mirrored.get(il, jl));
        } else if i == j {
            let d = local.get(il, jl);
            local.set(il, jl, T::from_real(d.real_part()));
        }
    });
    Ok(())
}

fn for_each_diagonal_local(meta: &DistMeta, offset: isize, mut f: impl FnMut(usize, usize)) {
    for k in 0..diagonal_length(meta.height(), meta.width(), offset) {
        let (i, j) = diagonal_entry(k, offset);
        if meta.is_local(i, j) {
            f(meta.local_row(i), meta.local_col(j));
        }
    }
}

/// Set every entry of the `offset` diagonal to `value`; local
pub fn set_diagonal<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A, value: T, offset: isize) {
    let meta = a.meta().clone();
    let mut local = a.local_mut();
    for_each_diagonal_local(&meta, offset, |il, jl| local.set(il, jl, value));
}

/// Add `shift` to every entry of the `offset` diagonal; local
pub fn shift_diagonal<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A, shift: T, offset: isize) {
    let meta = a.meta().clone();
    let mut local = a.local_mut();
    for_each_diagonal_local(&meta, offset, |il, jl| local.update(il, jl, shift));
}

/// `A = op(D) A` (left) or `A = A op(D)` (right) with `D = diag(d)`
///
/// `d` is a column vector in any layout; it is replicated first.
pub fn diagonal_scale<T, D, A>(side: Side, orient: Orientation, d: &D, a: &mut A) -> Result<()>
where
    T: Field,
    D: DistRead<T> + ?Sized,
    A: DistWrite<T> + ?Sized,
{
    let expected = match side {
        Side::Left => a.height(),
        Side::Right => a.width(),
    };
    assert_eq!((d.height(), d.width()), (expected, 1), "diagonal has the wrong shape");
    let diag = d.to_matrix()?;
    let meta = a.meta().clone();
    let mut local = a.local_mut();
    for_each_local(&meta, |il, jl, i, j| {
        let k = match side {
            Side::Left => i,
            Side::Right => j,
        };
        let mut s = diag.get(k, 0);
        if orient == Orientation::Adjoint {
            s = s.conj();
        }
        let v = local.get(il, jl);
        local.set(il, jl, s * v);
    });
    Ok(())
}

/// Swap global rows `i0` and `i1`
///
/// The two owners exchange their local rows over the column distribution's
/// communicator; everything else stays put.
pub fn row_swap<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A, i0: usize, i1: usize) -> Result<()> {
    let meta = a.meta().clone();
    assert!(
        i0 < meta.height() && i1 < meta.height(),
        "row swap ({i0}, {i1}) out of bounds for height {}",
        meta.height()
    );
    if i0 == i1 || !meta.participating() {
        return Ok(());
    }
    let (owner0, owner1) = (meta.row_owner(i0), meta.row_owner(i1));
    let me = meta.col_rank();
    let mut local = a.local_mut();
    let width = local.width();

    if owner0 == owner1 {
        if me == owner0 {
            let (l0, l1) = (meta.local_row(i0), meta.local_row(i1));
            for jl in 0..width {
                let tmp = local.get(l0, jl);
                local.set(l0, jl, local.get(l1, jl));
                local.set(l1, jl, tmp);
            }
        }
        return Ok(());
    }

    let (mine, partner) = if me == owner0 {
        (i0, owner1)
    } else if me == owner1 {
        (i1, owner0)
    } else {
        return Ok(());
    };
    let il = meta.local_row(mine);
    let send: Vec<T> = (0..width).map(|jl| local.get(il, jl)).collect();
    let mut recv = vec![T::zero(); width];
    meta.grid()
        .comm(meta.col_dist().comm_kind())
        .send_recv(&send, partner, &mut recv, partner)?;
    for (jl, &v) in recv.iter().enumerate() {
        local.set(il, jl, v);
    }
    Ok(())
}

/// Swap global columns `j0` and `j1`; see [`row_swap`]
pub fn column_swap<T: Element, A: DistWrite<T> + ?Sized>(a: &mut A, j0: usize, j1: usize) -> Result<()> {
    let meta = a.meta().clone();
    assert!(
        j0 < meta.width() && j1 < meta.width(),
        "column swap ({j0}, {j1}) out of bounds for width {}",
        meta.width()
    );
    if j0 == j1 || !meta.participating() {
        return Ok(());
    }
    let (owner0, owner1) = (meta.col_owner(j0), meta.col_owner(j1));
    let me = meta.row_rank();
    let mut local = a.local_mut();
    let height = local.height();

    if owner0 == owner1 {
        if me == owner0 {
            let (l0, l1) = (meta.local_col(j0), meta.local_col(j1));
            for il in 0..height {
                let tmp = local.get(il, l0);
                local.set(il, l0, local.get(il, l1));
                local.set(il, l1, tmp);
            }
        }
        return Ok(());
    }

    let (mine, partner) = if me == owner0 {
        (j0, owner1)
    } else if me == owner1 {
        (j1, owner0)
    } else {
        return Ok(());
    };
    let jl = meta.local_col(mine);
    let send: Vec<T> = (0..height).map(|il| local.get(il, jl)).collect();
    let mut recv = vec![T::zero(); height];
    meta.grid()
        .comm(meta.row_dist().comm_kind())
        .send_recv(&send, partner, &mut recv, partner)?;
    local.col_mut(jl).copy_from_slice(&recv);
    Ok(())
}

/// Position and magnitude of an extremal entry
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Location<R> {
    /// `|A(i, j)|`
    pub value: R,
    /// Row
    pub i: usize,
    /// Column
    pub j: usize,
}

/// Entry of largest magnitude
///
/// Ties go to the entry that comes first in column-major order, so every
/// process agrees on the answer. NaNs are skipped. An empty matrix, or a
/// call from outside the grid, yields a zero value at (0, 0). Collective
/// over `VC`.
pub fn max_abs_loc<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<Location<T::Real>> {
    let meta = a.meta();
    let zero = Location {
        value: <T::Real as Element>::zero(),
        i: 0,
        j: 0,
    };
    if !meta.grid().in_grid() {
        return Ok(zero);
    }
    let mut best = [[-1.0f64, 0.0, 0.0]];
    if meta.participating() && meta.redundant_comm().rank() == 0 {
        let local = a.local();
        for_each_local(meta, |il, jl, i, j| {
            let v = local.get(il, jl).abs_val().to_f64();
            if v > best[0][0] {
                best[0] = [v, i as f64, j as f64];
            }
        });
    }
    meta.grid().comm(CommKind::Vc).all_reduce_with(&mut best, |x, y| {
        let y_wins = y[0] > x[0] || (y[0] == x[0] && (y[2], y[1]) < (x[2], x[1]));
        if y_wins { y } else { x }
    })?;
    let [value, i, j] = best[0];
    if value < 0.0 {
        return Ok(zero);
    }
    Ok(Location {
        value: <T::Real as Element>::from_f64(value),
        i: i as usize,
        j: j as usize,
    })
}

/// Two-norm of every column of an `[MC,MR]` matrix
///
/// The result is an `[MR,STAR]` column vector aligned with `A`'s columns, so
/// each process holds the norms of exactly its own columns. Collective over
/// `MC`.
pub fn column_norms<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<DistMatrix<T::Real>> {
    let meta = a.meta();
    assert_eq!(
        meta.pair(),
        (Dist::Mc, Dist::Mr),
        "column norms need an [MC,MR] matrix"
    );
    let mut norms = DistMatrix::<T::Real>::new(meta.grid(), Dist::Mr, Dist::Star);
    norms.align_cols(meta.row_align());
    norms.resize(meta.width(), 1);
    if !meta.participating() {
        return Ok(norms);
    }
    let local = a.local();
    let mut sums: Vec<T::Real> = (0..local.width())
        .map(|jl| {
            (0..local.height()).fold(<T::Real as Element>::zero(), |acc, il| acc + local.get(il, jl).abs_sq())
        })
        .collect();
    meta.grid().comm(CommKind::Mc).all_reduce_sum(&mut sums)?;
    for (jl, s) in sums.into_iter().enumerate() {
        norms.set_local(jl, 0, s.sqrt_val());
    }
    Ok(norms)
}
