//! Householder reflectors shared by the QR, LQ and RQ factorizations
//!
//! A reflector is `H = I - τ u uᴴ` with one entry of `u` fixed to one. The
//! other entries of `u` are stored in the factored matrix, in a column for
//! QR and (conjugated) in a row for LQ and RQ.

use super::{frobenius_norm, spread, spread_transposed};
use crate::blas::{Orientation, local};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::{Element, Field, RealField};
use crate::error::Result;
use crate::grid::CommKind;

/// A generated reflector: `Hᴴ (α; x) = (β; 0)`
#[derive(Copy, Clone, Debug)]
pub(crate) struct Reflector<T: Field> {
    pub beta: T::Real,
    pub tau: T,
    /// Factor `x` is multiplied by to become the stored part of `u`
    pub scale: T,
}

/// Reflector annihilating `x` below `alpha`, given `‖x‖₂`
///
/// Returns `None` when `x` is already zero and `alpha` is real, in which
/// case `H = I` and `τ = 0`.
pub(crate) fn reflector<T: Field>(alpha: T, x_norm: T::Real) -> Option<Reflector<T>> {
    let zero = <T::Real as Element>::zero();
    let (re, im) = (alpha.real_part(), alpha.imag_part());
    if x_norm == zero && im == zero {
        return None;
    }
    let magnitude = (alpha.abs_sq() + x_norm * x_norm).sqrt_val();
    let beta = if re >= zero { -magnitude } else { magnitude };
    let tau = T::from_parts((beta - re) / beta, -im / beta);
    let scale = T::one() / (alpha - T::from_real(beta));
    Some(Reflector { beta, tau, scale })
}

/// Generate the reflector for column `j` of `a` below row `i` and store it
///
/// On return `a(i, j) = β` and `a(i+1.., j)` holds `u` without its leading
/// one. Returns `τ`.
pub(crate) fn reflect_column<T, A>(a: &mut A, i: usize, j: usize) -> Result<T>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let below = a.height() - i - 1;
    let alpha = a.get(i, j)?;
    let x_norm = frobenius_norm(&a.view(i + 1, j, below, 1))?;
    let Some(h) = reflector(alpha, x_norm) else {
        return Ok(T::zero());
    };
    local::scale(h.scale, a.view_mut(i + 1, j, below, 1).local_mut());
    a.set(i, j, T::from_real(h.beta));
    Ok(h.tau)
}

/// Generate the reflector for the conjugate of the `len` entries of row `i`
/// starting at column `j`; `unit` picks which of them becomes `β`
///
/// The rest of the row is left holding the conjugate of `u`. Returns `τ`.
pub(crate) fn reflect_row<T, A>(a: &mut A, i: usize, j: usize, len: usize, unit: usize) -> Result<T>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let alpha = a.get(i, j + unit)?.conj();
    // Entries other than the pivot
    let before = frobenius_norm(&a.view(i, j, 1, unit))?;
    let after = frobenius_norm(&a.view(i, j + unit + 1, 1, len - unit - 1))?;
    let x_norm = (before * before + after * after).sqrt_val();
    let Some(h) = reflector(alpha, x_norm) else {
        return Ok(T::zero());
    };
    let stored = h.scale.conj();
    local::scale(stored, a.view_mut(i, j, 1, unit).local_mut());
    local::scale(stored, a.view_mut(i, j + unit + 1, 1, len - unit - 1).local_mut());
    a.set(i, j + unit, T::from_real(h.beta));
    Ok(h.tau)
}

/// Where the non-unit part of a Householder vector is stored
#[derive(Copy, Clone, Debug)]
pub(crate) enum Stored {
    /// `len` entries of column `j` from row `i`, unit first
    Column { i: usize, j: usize, len: usize },
    /// Conjugated, `len` entries of row `i` from column `j`, unit at `unit`
    Row { i: usize, j: usize, len: usize, unit: usize },
}

/// The Householder vector `u` laid out as `[dist,STAR]` and aligned with the
/// rows (`MC`) or columns (`MR`) of `target`
pub(crate) fn householder_vector<T, A, B>(a: &A, stored: Stored, dist: Dist, target: &B) -> Result<DistMatrix<T>>
where
    T: Field,
    A: DistRead<T> + ?Sized,
    B: DistRead<T> + ?Sized,
{
    let (mut u, unit) = match stored {
        Stored::Column { i, j, len } => (spread(&a.view(i, j, len, 1), dist, Dist::Star, target.meta())?, 0),
        Stored::Row { i, j, len, unit } => (
            spread_transposed(&a.view(i, j, 1, len), dist, Dist::Star, target.meta(), true)?,
            unit,
        ),
    };
    u.set(unit, 0, T::one());
    Ok(u)
}

/// `B = (I - τ u uᴴ) B` with `u` a `[MC,STAR]` vector aligned with `B`'s rows
///
/// Collective over the mesh columns.
pub(crate) fn apply_from_left<T, B>(tau: T, u: &DistMatrix<T>, b: &mut B) -> Result<()>
where
    T: Field,
    B: DistWrite<T> + ?Sized,
{
    if tau == T::zero() {
        return Ok(());
    }
    let ul = u.local().col(0);
    let bl = b.local();
    let mut z: Vec<T> = (0..bl.width()).map(|jl| local::dot(ul, bl.col(jl))).collect();
    b.grid().comm(CommKind::Mc).all_reduce_sum(&mut z)?;
    local::ger(-tau, ul, &z, b.local_mut());
    Ok(())
}

/// `B = B (I - τ u uᴴ)` with `u` a `[MR,STAR]` vector aligned with `B`'s
/// columns
///
/// Collective over the mesh rows.
pub(crate) fn apply_from_right<T, B>(tau: T, u: &DistMatrix<T>, b: &mut B) -> Result<()>
where
    T: Field,
    B: DistWrite<T> + ?Sized,
{
    if tau == T::zero() {
        return Ok(());
    }
    let ul = u.local().col(0);
    let bl = b.local();
    let mut y = vec![T::zero(); bl.height()];
    local::gemv(Orientation::Normal, T::one(), bl, ul, T::zero(), &mut y);
    b.grid().comm(CommKind::Mr).all_reduce_sum(&mut y)?;
    let u_conj: Vec<T> = ul.iter().map(|v| v.conj()).collect();
    local::ger(-tau, &y, &u_conj, b.local_mut());
    Ok(())
}

/// Reflector indices in the order a product of them is applied
pub(crate) fn sweep(count: usize, ascending: bool) -> Vec<usize> {
    if ascending {
        (0..count).collect()
    } else {
        (0..count).rev().collect()
    }
}
