//! Matrix norms
//!
//! Every process of the grid gets the same value. Replicated entries are
//! counted once: only the first process of each redundant group
//! contributes. Off-grid processes get zero.

use crate::blas::{UpperOrLower, local};
use crate::dist_matrix::DistRead;
use crate::dtype::{Element, Field, RealField};
use crate::error::Result;
use crate::grid::CommKind;

/// Which norm [`norm`] and [`hermitian_norm`] compute
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NormType {
    /// Largest entry magnitude
    Max,
    /// Largest column sum of magnitudes
    One,
    /// Largest row sum of magnitudes
    Infinity,
    /// Square root of the sum of squared magnitudes
    Frobenius,
}

/// Whether the calling process holds entries that count
fn contributes<T: Element, A: DistRead<T> + ?Sized>(a: &A) -> bool {
    let meta = a.meta();
    meta.participating() && meta.redundant_comm().rank() == 0
}

/// Visit the counted local entries as `(i, j, value)`
///
/// With `triangle` set only entries of that triangle are visited, which is
/// all a Hermitian matrix needs.
fn for_each_counted<T, A>(a: &A, triangle: Option<UpperOrLower>, mut f: impl FnMut(usize, usize, T))
where
    T: Element,
    A: DistRead<T> + ?Sized,
{
    if !contributes(a) {
        return;
    }
    let meta = a.meta();
    let (rows, cols) = meta.my_spans();
    let local = a.local();
    for jl in 0..cols.len {
        let j = cols.global(jl);
        for il in 0..rows.len {
            let i = rows.global(il);
            let keep = match triangle {
                None => true,
                Some(UpperOrLower::Lower) => i >= j,
                Some(UpperOrLower::Upper) => i <= j,
            };
            if keep {
                f(i, j, local.get(il, jl));
            }
        }
    }
}

fn max_impl<T: Field, A: DistRead<T> + ?Sized>(a: &A, triangle: Option<UpperOrLower>) -> Result<T::Real> {
    let zero = <T::Real as Element>::zero();
    if !a.grid().in_grid() {
        return Ok(zero);
    }
    let mut best = zero;
    for_each_counted(a, triangle, |_, _, v: T| best = best.max_val(v.abs_val()));
    let mut buf = [best];
    a.grid().comm(CommKind::Vc).all_reduce_with(&mut buf, |x, y| x.max_val(y))?;
    Ok(buf[0])
}

/// Column sums (`by_column`) or row sums of magnitudes, then their maximum
fn sum_impl<T: Field, A: DistRead<T> + ?Sized>(
    a: &A,
    triangle: Option<UpperOrLower>,
    by_column: bool,
) -> Result<T::Real> {
    let zero = <T::Real as Element>::zero();
    if !a.grid().in_grid() {
        return Ok(zero);
    }
    let len = if by_column { a.width() } else { a.height() };
    let mut sums = vec![zero; len];
    for_each_counted(a, triangle, |i, j, v: T| {
        let magnitude = v.abs_val();
        if triangle.is_some() {
            // Row and column sums coincide for a Hermitian matrix
            sums[j] = sums[j] + magnitude;
            if i != j {
                sums[i] = sums[i] + magnitude;
            }
        } else if by_column {
            sums[j] = sums[j] + magnitude;
        } else {
            sums[i] = sums[i] + magnitude;
        }
    });
    a.grid().comm(CommKind::Vc).all_reduce_sum(&mut sums)?;
    Ok(sums.into_iter().fold(zero, |acc, s| acc.max_val(s)))
}

fn frobenius_impl<T: Field, A: DistRead<T> + ?Sized>(a: &A, triangle: Option<UpperOrLower>) -> Result<T::Real> {
    let zero = <T::Real as Element>::zero();
    if !a.grid().in_grid() {
        return Ok(zero);
    }
    let mut scale = zero;
    let mut sum = <T::Real as Element>::one();
    for_each_counted(a, triangle, |i, j, v: T| {
        local::ssq_update(&[v], &mut scale, &mut sum);
        if triangle.is_some() && i != j {
            local::ssq_update(&[v], &mut scale, &mut sum);
        }
    });
    let vc = a.grid().comm(CommKind::Vc);
    let mut all = vec![zero; 2 * vc.size()];
    vc.all_gather(&[scale, sum], &mut all)?;
    let (scale, sum) = all
        .chunks_exact(2)
        .fold((zero, <T::Real as Element>::one()), |acc, pair| {
            local::ssq_combine(acc, (pair[0], pair[1]))
        });
    Ok(scale * sum.sqrt_val())
}

/// `max |A(i, j)|`; collective over the grid
pub fn max_norm<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<T::Real> {
    max_impl(a, None)
}

/// `max_j Σ_i |A(i, j)|`; collective over the grid
pub fn one_norm<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<T::Real> {
    sum_impl(a, None, true)
}

/// `max_i Σ_j |A(i, j)|`; collective over the grid
pub fn infinity_norm<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<T::Real> {
    sum_impl(a, None, false)
}

/// `sqrt(Σ |A(i, j)|²)` without intermediate overflow; collective over the
/// grid
pub fn frobenius_norm<T: Field, A: DistRead<T> + ?Sized>(a: &A) -> Result<T::Real> {
    frobenius_impl(a, None)
}

/// Any of the norms above
pub fn norm<T: Field, A: DistRead<T> + ?Sized>(a: &A, kind: NormType) -> Result<T::Real> {
    match kind {
        NormType::Max => max_norm(a),
        NormType::One => one_norm(a),
        NormType::Infinity => infinity_norm(a),
        NormType::Frobenius => frobenius_norm(a),
    }
}

fn assert_square<T: Element, A: DistRead<T> + ?Sized>(a: &A) {
    assert_eq!(a.height(), a.width(), "Hermitian norms need a square matrix");
}

/// [`max_norm`] of the Hermitian matrix stored in the `uplo` triangle of `A`
pub fn hermitian_max_norm<T: Field, A: DistRead<T> + ?Sized>(uplo: UpperOrLower, a: &A) -> Result<T::Real> {
    assert_square(a);
    max_impl(a, Some(uplo))
}

/// [`one_norm`] of the Hermitian matrix stored in the `uplo` triangle of `A`
pub fn hermitian_one_norm<T: Field, A: DistRead<T> + ?Sized>(uplo: UpperOrLower, a: &A) -> Result<T::Real> {
    assert_square(a);
    sum_impl(a, Some(uplo), true)
}

/// Equal to [`hermitian_one_norm`]
pub fn hermitian_infinity_norm<T: Field, A: DistRead<T> + ?Sized>(uplo: UpperOrLower, a: &A) -> Result<T::Real> {
    assert_square(a);
    sum_impl(a, Some(uplo), false)
}

/// [`frobenius_norm`] of the Hermitian matrix stored in the `uplo` triangle
pub fn hermitian_frobenius_norm<T: Field, A: DistRead<T> + ?Sized>(uplo: UpperOrLower, a: &A) -> Result<T::Real> {
    assert_square(a);
    frobenius_impl(a, Some(uplo))
}

/// Any of the Hermitian norms above
pub fn hermitian_norm<T: Field, A: DistRead<T> + ?Sized>(kind: NormType, uplo: UpperOrLower, a: &A) -> Result<T::Real> {
    match kind {
        NormType::Max => hermitian_max_norm(uplo, a),
        NormType::One => hermitian_one_norm(uplo, a),
        NormType::Infinity => hermitian_infinity_norm(uplo, a),
        NormType::Frobenius => hermitian_frobenius_norm(uplo, a),
    }
}
