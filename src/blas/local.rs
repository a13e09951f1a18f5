//! Process-local dense kernels
//!
//! Plain loops over column-major blocks with a leading dimension. Loops over
//! independent columns run on rayon when the `rayon` feature is enabled and
//! the work crosses [`PARALLEL_THRESHOLD`].

use super::{Orientation, Side, UnitOrNonUnit, UpperOrLower};
use crate::dtype::{Element, Field, RealField};
use crate::matrix::{MatrixMut, MatrixRef};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Multiply-adds below which column loops stay on the calling thread
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Run `f(j, column)` over every column of `c`
#[cfg_attr(not(feature = "rayon"), allow(unused_variables))]
fn for_each_col<T, F>(c: MatrixMut<'_, T>, work: usize, f: F)
where
    T: Element,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    let (data, height, width, ldim) = c.into_raw();
    if height == 0 || width == 0 {
        return;
    }

    #[cfg(feature = "rayon")]
    if work >= PARALLEL_THRESHOLD {
        data.par_chunks_mut(ldim)
            .enumerate()
            .for_each(|(j, col)| f(j, &mut col[..height]));
        return;
    }

    for (j, col) in data.chunks_mut(ldim).enumerate() {
        f(j, &mut col[..height]);
    }
}

/// Entry (i, j) of `op(a)`
#[inline]
pub fn op_get<T: Field>(a: MatrixRef<'_, T>, orient: Orientation, i: usize, j: usize) -> T {
    match orient {
        Orientation::Normal => a.get(i, j),
        Orientation::Transpose => a.get(j, i),
        Orientation::Adjoint => a.get(j, i).conj(),
    }
}

/// Shape of `op(a)`
#[inline]
pub fn op_shape<T: Element>(a: MatrixRef<'_, T>, orient: Orientation) -> (usize, usize) {
    if orient.is_transposed() {
        (a.width(), a.height())
    } else {
        (a.height(), a.width())
    }
}

/// `C = α op(A) op(B) + β C`
///
/// With `β = 0` the old contents of `C` are ignored, NaNs included.
pub fn gemm<T: Field>(
    orient_a: Orientation,
    orient_b: Orientation,
    alpha: T,
    a: MatrixRef<'_, T>,
    b: MatrixRef<'_, T>,
    beta: T,
    c: MatrixMut<'_, T>,
) {
    let (m, n) = (c.height(), c.width());
    let (am, k) = op_shape(a, orient_a);
    let (bk, bn) = op_shape(b, orient_b);
    assert!(
        am == m && bk == k && bn == n,
        "nonconformant gemm: op(A) is {am}x{k}, op(B) is {bk}x{bn}, C is {m}x{n}"
    );

    for_each_col(c, m * n * k.max(1), |j, col| {
        if beta == T::zero() {
            col.fill(T::zero());
        } else if beta != T::one() {
            for v in col.iter_mut() {
                *v = beta * *v;
            }
        }
        if alpha == T::zero() {
            return;
        }
        for l in 0..k {
            let blj = op_get(b, orient_b, l, j);
            if blj == T::zero() {
                continue;
            }
            let t = alpha * blj;
            if orient_a == Orientation::Normal {
                for (ci, &ail) in col.iter_mut().zip(a.col(l)) {
                    *ci = *ci + t * ail;
                }
            } else {
                for (i, ci) in col.iter_mut().enumerate() {
                    *ci = *ci + t * op_get(a, orient_a, i, l);
                }
            }
        }
    });
}

/// `y = α op(A) x + β y`
pub fn gemv<T: Field>(orient: Orientation, alpha: T, a: MatrixRef<'_, T>, x: &[T], beta: T, y: &mut [T]) {
    let (m, n) = op_shape(a, orient);
    assert!(
        x.len() == n && y.len() == m,
        "nonconformant gemv: op(A) is {m}x{n}, x has {}, y has {}",
        x.len(),
        y.len()
    );
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = T::zero();
        for (l, &xl) in x.iter().enumerate() {
            sum = sum + op_get(a, orient, i, l) * xl;
        }
        let old = if beta == T::zero() { T::zero() } else { beta * *yi };
        *yi = old + alpha * sum;
    }
}

/// Rank-one update `A += α x yᵀ` (no conjugation)
pub fn ger<T: Field>(alpha: T, x: &[T], y: &[T], a: MatrixMut<'_, T>) {
    assert!(
        x.len() == a.height() && y.len() == a.width(),
        "nonconformant ger: x has {}, y has {}, A is {}x{}",
        x.len(),
        y.len(),
        a.height(),
        a.width()
    );
    let work = x.len() * y.len();
    for_each_col(a, work, |j, col| {
        let t = alpha * y[j];
        if t == T::zero() {
            return;
        }
        for (aij, &xi) in col.iter_mut().zip(x) {
            *aij = *aij + xi * t;
        }
    });
}

/// Forward or back substitution with the triangle `m` (accessed entrywise)
fn substitute<T: Field>(n: usize, lower: bool, unit: bool, m: impl Fn(usize, usize) -> T, x: &mut [T]) {
    if lower {
        for i in 0..n {
            let mut s = x[i];
            for k in 0..i {
                s = s - m(i, k) * x[k];
            }
            x[i] = if unit { s } else { s / m(i, i) };
        }
    } else {
        for i in (0..n).rev() {
            let mut s = x[i];
            for k in i + 1..n {
                s = s - m(i, k) * x[k];
            }
            x[i] = if unit { s } else { s / m(i, i) };
        }
    }
}

/// Solve `op(A) X = α B` (left) or `X op(A) = α B` (right) in place of `B`
///
/// Only the `uplo` triangle of `A` is read. Zero pivots are not checked;
/// they produce infinities the same way reference BLAS does.
pub fn trsm<T: Field>(
    side: Side,
    uplo: UpperOrLower,
    orient: Orientation,
    diag: UnitOrNonUnit,
    alpha: T,
    a: MatrixRef<'_, T>,
    mut b: MatrixMut<'_, T>,
) {
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
    let unit = diag == UnitOrNonUnit::Unit;
    // Triangle occupied by op(A)
    let lower = (uplo == UpperOrLower::Lower) != orient.is_transposed();

    match side {
        Side::Left => {
            let work = n * n * b.width();
            for_each_col(b, work, |_, col| {
                if alpha != T::one() {
                    for v in col.iter_mut() {
                        *v = alpha * *v;
                    }
                }
                substitute(n, lower, unit, |i, j| op_get(a, orient, i, j), col);
            });
        }
        Side::Right => {
            // x op(A) = b  <=>  op(A)ᵀ xᵀ = bᵀ, and op(A)ᵀ occupies the other triangle
            let mut row = vec![T::zero(); n];
            for i in 0..b.height() {
                for (j, v) in row.iter_mut().enumerate() {
                    *v = alpha * b.get(i, j);
                }
                substitute(n, !lower, unit, |r, s| op_get(a, orient, s, r), &mut row);
                for (j, &v) in row.iter().enumerate() {
                    b.set(i, j, v);
                }
            }
        }
    }
}

/// Solve `(U - σⱼ I) xⱼ = bⱼ` for every column `j` in place of `B`
///
/// Only the `uplo` triangle of `U` is read.
pub fn multi_shift_trsm<T: Field>(uplo: UpperOrLower, u: MatrixRef<'_, T>, shifts: &[T], b: MatrixMut<'_, T>) {
    let (n, width) = (b.height(), b.width());
    assert!(
        u.height() == n && u.width() == n,
        "triangular operand is {}x{}, expected {n}x{n}",
        u.height(),
        u.width()
    );
    assert_eq!(shifts.len(), width, "one shift per right-hand side");
    let lower = uplo == UpperOrLower::Lower;
    for_each_col(b, n * n * width, |j, col| {
        let sigma = shifts[j];
        let shifted = |r: usize, s: usize| if r == s { u.get(r, s) - sigma } else { u.get(r, s) };
        substitute(n, lower, false, shifted, col);
    });
}

/// `A = α A`
pub fn scale<T: Field>(alpha: T, a: MatrixMut<'_, T>) {
    if alpha == T::one() {
        return;
    }
    let work = a.height() * a.width();
    for_each_col(a, work, |_, col| {
        for v in col.iter_mut() {
            *v = alpha * *v;
        }
    });
}

/// `Σ conj(xᵢ) yᵢ`
pub fn dot<T: Field>(x: &[T], y: &[T]) -> T {
    assert_eq!(x.len(), y.len(), "dot of vectors with different lengths");
    x.iter().zip(y).fold(T::zero(), |acc, (&a, &b)| acc + a.conj() * b)
}

/// Fold `x` into a scaled sum of squares: on return
/// `scale² · sum = scale₀² · sum₀ + Σ |xᵢ|²`
///
/// Real and imaginary parts are folded separately so nothing overflows.
pub fn ssq_update<T: Field>(x: &[T], scale: &mut T::Real, sum: &mut T::Real) {
    let zero = <T::Real as Element>::zero();
    let one = <T::Real as Element>::one();
    for &v in x {
        for part in [v.real_part(), v.imag_part()] {
            let a = part.abs_val();
            if a.is_nan_val() {
                *scale = a;
                continue;
            }
            if a == zero {
                continue;
            }
            if *scale < a {
                let r = *scale / a;
                *sum = one + *sum * r * r;
                *scale = a;
            } else {
                let r = a / *scale;
                *sum = *sum + r * r;
            }
        }
    }
}

/// Combine two scaled sums of squares
pub fn ssq_combine<R: RealField>((scale_a, sum_a): (R, R), (scale_b, sum_b): (R, R)) -> (R, R) {
    let zero = R::zero();
    if scale_a.is_nan_val() || scale_b.is_nan_val() {
        let nan = if scale_a.is_nan_val() { scale_a } else { scale_b };
        return (nan, R::one());
    }
    if scale_b == zero {
        return (scale_a, sum_a);
    }
    if scale_a == zero {
        return (scale_b, sum_b);
    }
    if scale_a >= scale_b {
        let r = scale_b / scale_a;
        (scale_a, sum_a + sum_b * r * r)
    } else {
        let r = scale_a / scale_b;
        (scale_b, sum_b + sum_a * r * r)
    }
}

/// Euclidean norm without overflow
pub fn nrm2<T: Field>(x: &[T]) -> T::Real {
    let mut scale = <T::Real as Element>::zero();
    let mut sum = <T::Real as Element>::one();
    ssq_update(x, &mut scale, &mut sum);
    scale * sum.sqrt_val()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Complex128;
    use crate::matrix::Matrix;

    fn naive_product(a: &Matrix<f64>, b: &Matrix<f64>) -> Matrix<f64> {
        Matrix::from_fn(a.height(), b.width(), |i, j| {
            (0..a.width()).map(|l| a.get(i, l) * b.get(l, j)).sum()
        })
    }

    #[test]
    fn test_gemm_orientations() {
        let a = Matrix::from_fn(3, 2, |i, j| (i + 2 * j) as f64 + 1.0);
        let b = Matrix::from_fn(2, 4, |i, j| (i * j) as f64 - 1.0);
        let expected = naive_product(&a, &b);

        let mut c = Matrix::zeros(3, 4);
        gemm(Orientation::Normal, Orientation::Normal, 1.0, a.as_ref(), b.as_ref(), 0.0, c.as_mut());
        assert_eq!(c, expected);

        let at = Matrix::from_fn(2, 3, |i, j| a.get(j, i));
        let bt = Matrix::from_fn(4, 2, |i, j| b.get(j, i));
        let mut c2 = Matrix::from_fn(3, 4, |_, _| 1.0);
        gemm(Orientation::Transpose, Orientation::Transpose, 2.0, at.as_ref(), bt.as_ref(), -1.0, c2.as_mut());
        for j in 0..4 {
            for i in 0..3 {
                assert_eq!(c2.get(i, j), 2.0 * expected.get(i, j) - 1.0);
            }
        }
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let a = Matrix::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let mut c = Matrix::from_fn(2, 2, |_, _| f64::NAN);
        gemm(Orientation::Normal, Orientation::Normal, 1.0, a.as_ref(), a.as_ref(), 0.0, c.as_mut());
        assert_eq!(c, a);
    }

    #[test]
    fn test_gemm_adjoint_conjugates() {
        let a = Matrix::from_fn(1, 1, |_, _| Complex128::new(0.0, 1.0));
        let mut c = Matrix::zeros(1, 1);
        gemm(
            Orientation::Adjoint,
            Orientation::Normal,
            Complex128::ONE,
            a.as_ref(),
            a.as_ref(),
            Complex128::ZERO,
            c.as_mut(),
        );
        assert_eq!(c.get(0, 0), Complex128::ONE);
    }

    #[test]
    fn test_trsm_left_and_right() {
        let l = Matrix::from_fn(3, 3, |i, j| if j <= i { (i + j + 1) as f64 } else { 99.0 });
        let x = Matrix::from_fn(3, 2, |i, j| (i as f64) - (j as f64));
        let lower = Matrix::from_fn(3, 3, |i, j| if j <= i { l.get(i, j) } else { 0.0 });
        let mut b = naive_product(&lower, &x);
        trsm(
            Side::Left,
            UpperOrLower::Lower,
            Orientation::Normal,
            UnitOrNonUnit::NonUnit,
            1.0,
            l.as_ref(),
            b.as_mut(),
        );
        for j in 0..2 {
            for i in 0..3 {
                assert!((b.get(i, j) - x.get(i, j)).abs() < 1e-12);
            }
        }

        // X Lᵀ = B with the same lower storage
        let y = Matrix::from_fn(2, 3, |i, j| (i * 3 + j) as f64);
        let lt = Matrix::from_fn(3, 3, |i, j| lower.get(j, i));
        let mut b = naive_product(&y, &lt);
        trsm(
            Side::Right,
            UpperOrLower::Lower,
            Orientation::Transpose,
            UnitOrNonUnit::NonUnit,
            1.0,
            l.as_ref(),
            b.as_mut(),
        );
        for j in 0..3 {
            for i in 0..2 {
                assert!((b.get(i, j) - y.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_trsm_unit_diagonal_is_not_read() {
        let u = Matrix::from_fn(2, 2, |i, j| if (i, j) == (0, 1) { 2.0 } else { 0.0 });
        let mut b = Matrix::from_col_major(2, 1, vec![5.0, 1.0]);
        trsm(
            Side::Left,
            UpperOrLower::Upper,
            Orientation::Normal,
            UnitOrNonUnit::Unit,
            1.0,
            u.as_ref(),
            b.as_mut(),
        );
        assert_eq!(b.get(0, 0), 3.0);
        assert_eq!(b.get(1, 0), 1.0);
    }

    #[test]
    fn test_multi_shift_trsm_columns_use_their_own_shift() {
        let u = Matrix::from_fn(2, 2, |i, j| if j >= i { (1 + i + j) as f64 } else { 0.0 });
        let shifts = [0.5, -1.0];
        // (U - σ I) x = b with x = [1, 1] for both columns
        let b = Matrix::from_fn(2, 2, |i, j| {
            let row: f64 = (0..2).filter(|&k| k >= i).map(|k| u.get(i, k)).sum();
            row - shifts[j]
        });
        let mut x = b.clone();
        multi_shift_trsm(UpperOrLower::Upper, u.as_ref(), &shifts, x.as_mut());
        for j in 0..2 {
            for i in 0..2 {
                assert!((x.get(i, j) - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_ger_and_gemv() {
        let mut a = Matrix::<f64>::zeros(2, 3);
        ger(2.0, &[1.0, 2.0], &[1.0, 0.0, -1.0], a.as_mut());
        assert_eq!(a.get(1, 2), -4.0);
        let mut y = [1.0, 1.0];
        gemv(Orientation::Normal, 1.0, a.as_ref(), &[1.0, 1.0, 1.0], 1.0, &mut y);
        assert_eq!(y, [1.0, 1.0]);
    }

    #[test]
    fn test_nrm2_and_ssq() {
        assert_eq!(nrm2(&[3.0f64, 4.0]), 5.0);
        assert_eq!(nrm2::<f64>(&[]), 0.0);
        let huge = 1e300f64;
        assert!((nrm2(&[huge, huge]) / huge - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(nrm2(&[Complex128::new(3.0, 4.0)]), 5.0);

        let (mut s1, mut q1) = (0.0f64, 1.0f64);
        ssq_update(&[3.0f64], &mut s1, &mut q1);
        let (mut s2, mut q2) = (0.0f64, 1.0f64);
        ssq_update(&[4.0f64], &mut s2, &mut q2);
        let (s, q) = ssq_combine((s1, q1), (s2, q2));
        assert!((s * q.sqrt() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_dot_conjugates_first_argument() {
        let x = [Complex128::new(0.0, 1.0)];
        assert_eq!(dot(&x, &x), Complex128::ONE);
    }
}
