//! Integration tests for the distributed BLAS kernels
//!
//! Every result is gathered with `to_matrix` and checked against a plain
//! local computation.

mod common;

use common::{assert_allclose_f64, entries, matmul, on_grid, sample, sample_c, transpose};
use distla::blas::{
    self, Orientation, Side, UnitOrNonUnit, UpperOrLower, column_norms, gemm, max_abs_loc, multi_shift_trsm, trmm,
    trsm,
};
use distla::prelude::*;

fn triangle(a: &Matrix<f64>, uplo: UpperOrLower, diag: UnitOrNonUnit) -> Matrix<f64> {
    Matrix::from_fn(a.height(), a.width(), |i, j| {
        let keep = match uplo {
            UpperOrLower::Lower => i >= j,
            UpperOrLower::Upper => i <= j,
        };
        if i == j && diag == UnitOrNonUnit::Unit {
            1.0
        } else if keep {
            a.get(i, j)
        } else {
            0.0
        }
    })
}

#[test]
fn test_gemm_all_orientations() {
    let (m, n, k) = (7, 5, 6);
    let cases = [
        (Orientation::Normal, Orientation::Normal),
        (Orientation::Transpose, Orientation::Normal),
        (Orientation::Normal, Orientation::Transpose),
        (Orientation::Adjoint, Orientation::Adjoint),
    ];
    let results = on_grid(6, |env, grid| {
        let _bs = env.scoped_block_size(2);
        let mut out = Vec::new();
        for (oa, ob) in cases {
            let (ah, aw) = if oa.is_transposed() { (k, m) } else { (m, k) };
            let (bh, bw) = if ob.is_transposed() { (n, k) } else { (k, n) };
            let a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, ah, aw, |i, j| sample(i, j, 7));
            let b = DistMatrix::from_fn(&grid, Dist::Vc, Dist::Star, bh, bw, |i, j| sample(i + 1, j, 7));
            let mut c = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, m, n, |i, j| (i * j) as f64);
            gemm(oa, ob, 2.0, &a, &b, -1.0, &mut c)?;
            out.push(c.to_matrix()?);
        }
        Ok(out)
    });
    for per_rank in results {
        for ((oa, ob), c) in cases.iter().zip(per_rank) {
            let (ah, aw) = if oa.is_transposed() { (k, m) } else { (m, k) };
            let (bh, bw) = if ob.is_transposed() { (n, k) } else { (k, n) };
            let a = Matrix::from_fn(ah, aw, |i, j| sample(i, j, 7));
            let b = Matrix::from_fn(bh, bw, |i, j| sample(i + 1, j, 7));
            let a = if oa.is_transposed() { transpose(&a) } else { a };
            let b = if ob.is_transposed() { transpose(&b) } else { b };
            let ab = matmul(&a, &b);
            let want: Vec<f64> = (0..n)
                .flat_map(|j| (0..m).map(move |i| (i, j)))
                .map(|(i, j)| 2.0 * ab.get(i, j) - (i * j) as f64)
                .collect();
            assert_allclose_f64(&entries(&c), &want, 1e-12, 1e-12, &format!("gemm {oa:?} {ob:?}"));
        }
    }
}

#[test]
fn test_gemm_into_view_and_other_layout() {
    let results = on_grid(4, |env, grid| {
        let _bs = env.scoped_block_size(3);
        let a = DistMatrix::from_fn(&grid, Dist::Star, Dist::Vr, 4, 3, |i, j| sample(i, j, 4));
        let b = DistMatrix::from_fn(&grid, Dist::Mr, Dist::Mc, 3, 2, |i, j| sample(j, i, 4));
        let mut c = DistMatrix::<f64>::with_shape(&grid, Dist::Vr, Dist::Star, 6, 4);
        gemm(Orientation::Normal, Orientation::Normal, 1.0, &a, &b, 0.0, &mut c.view_mut(1, 2, 4, 2))?;
        Ok(c.to_matrix()?)
    });
    let a = Matrix::from_fn(4, 3, |i, j| sample(i, j, 4));
    let b = Matrix::from_fn(3, 2, |i, j| sample(j, i, 4));
    let ab = matmul(&a, &b);
    for c in results {
        for i in 0..6 {
            for j in 0..4 {
                let inside = (1..5).contains(&i) && (2..4).contains(&j);
                let want = if inside { ab.get(i - 1, j - 2) } else { 0.0 };
                assert!((c.get(i, j) - want).abs() < 1e-12, "({i}, {j})");
            }
        }
    }
}

#[test]
fn test_trsm_left_and_right() {
    let n = 7;
    let cases = [
        (Side::Left, UpperOrLower::Lower, Orientation::Normal, UnitOrNonUnit::NonUnit),
        (Side::Left, UpperOrLower::Upper, Orientation::Transpose, UnitOrNonUnit::NonUnit),
        (Side::Right, UpperOrLower::Upper, Orientation::Normal, UnitOrNonUnit::Unit),
        (Side::Right, UpperOrLower::Lower, Orientation::Adjoint, UnitOrNonUnit::NonUnit),
    ];
    let results = on_grid(6, |env, grid| {
        let _bs = env.scoped_block_size(2);
        let a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| sample(i, j, n));
        let mut out = Vec::new();
        for (side, uplo, orient, diag) in cases {
            let (bh, bw) = if side == Side::Left { (n, 4) } else { (4, n) };
            let mut b = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, bh, bw, |i, j| sample(i + 2, j, n));
            trsm(side, uplo, orient, diag, 3.0, &a, &mut b)?;
            out.push(b.to_matrix()?);
        }
        Ok(out)
    });
    let a = Matrix::from_fn(n, n, |i, j| sample(i, j, n));
    for per_rank in results {
        for ((side, uplo, orient, diag), x) in cases.iter().zip(per_rank) {
            let t = triangle(&a, *uplo, *diag);
            let op = if orient.is_transposed() { transpose(&t) } else { t };
            let lhs = if *side == Side::Left { matmul(&op, &x) } else { matmul(&x, &op) };
            let b = Matrix::from_fn(x.height(), x.width(), |i, j| 3.0 * sample(i + 2, j, n));
            assert_allclose_f64(&entries(&lhs), &entries(&b), 1e-10, 1e-10, &format!("trsm {side:?} {uplo:?}"));
        }
    }
}

#[test]
fn test_trmm_matches_reference() {
    let n = 5;
    let results = on_grid(4, |env, grid| {
        let _bs = env.scoped_block_size(2);
        let a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| sample(i, j, n));
        let mut left = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 3, |i, j| sample(i, j + 1, n));
        trmm(Side::Left, UpperOrLower::Upper, Orientation::Normal, UnitOrNonUnit::NonUnit, 1.0, &a, &mut left)?;
        let mut right = DistMatrix::from_fn(&grid, Dist::Vc, Dist::Star, 3, n, |i, j| sample(i + 1, j, n));
        trmm(Side::Right, UpperOrLower::Lower, Orientation::Transpose, UnitOrNonUnit::Unit, -2.0, &a, &mut right)?;
        Ok((left.to_matrix()?, right.to_matrix()?))
    });
    let a = Matrix::from_fn(n, n, |i, j| sample(i, j, n));
    let upper = triangle(&a, UpperOrLower::Upper, UnitOrNonUnit::NonUnit);
    let unit_lower_t = transpose(&triangle(&a, UpperOrLower::Lower, UnitOrNonUnit::Unit));
    let b_left = Matrix::from_fn(n, 3, |i, j| sample(i, j + 1, n));
    let b_right = Matrix::from_fn(3, n, |i, j| sample(i + 1, j, n));
    let want_left = entries(&matmul(&upper, &b_left));
    let want_right: Vec<f64> = entries(&matmul(&b_right, &unit_lower_t)).into_iter().map(|v| -2.0 * v).collect();
    for (left, right) in results {
        assert_allclose_f64(&entries(&left), &want_left, 1e-12, 1e-12, "trmm left");
        assert_allclose_f64(&entries(&right), &want_right, 1e-12, 1e-12, "trmm right");
    }
}

#[test]
fn test_multi_shift_trsm_solves_each_column() {
    let n = 6;
    let shifts: Vec<Complex128> = (0..4).map(|k| Complex128::new(0.5 * k as f64, 1.0 - k as f64)).collect();
    let results = on_grid(6, |env, grid| {
        let _bs = env.scoped_block_size(2);
        let u = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| sample_c(i, j, n));
        let s = DistMatrix::from_fn(&grid, Dist::Vr, Dist::Star, 4, 1, |k, _| shifts[k]);
        let mut x = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 4, |i, j| sample_c(i + j, j, n));
        multi_shift_trsm(Side::Left, UpperOrLower::Upper, Orientation::Normal, Complex128::new(1.0, 0.0), &u, &s, &mut x)?;
        let mut y = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 4, |i, j| sample_c(i + j, j, n));
        multi_shift_trsm(Side::Left, UpperOrLower::Upper, Orientation::Adjoint, Complex128::new(1.0, 0.0), &u, &s, &mut y)?;
        let right = multi_shift_trsm(
            Side::Right,
            UpperOrLower::Upper,
            Orientation::Normal,
            Complex128::new(1.0, 0.0),
            &u,
            &s,
            &mut y,
        );
        Ok((x.to_matrix()?, y.to_matrix()?, matches!(right, Err(Error::NotImplemented { .. }))))
    });
    for (x, y, right_rejected) in results {
        assert!(right_rejected);
        for (k, &sigma) in shifts.iter().enumerate() {
            for i in 0..n {
                // (U - σI) x_k, row i
                let mut ux = Complex128::new(0.0, 0.0);
                // (U - σI)ᴴ y_k, row i
                let mut uy = Complex128::new(0.0, 0.0);
                for j in 0..n {
                    let mut uij = if i <= j { sample_c(i, j, n) } else { Complex128::new(0.0, 0.0) };
                    if i == j {
                        uij = uij - sigma;
                    }
                    ux = ux + uij * x.get(j, k);
                    let mut uji = if j <= i { sample_c(j, i, n) } else { Complex128::new(0.0, 0.0) };
                    if i == j {
                        uji = uji - sigma;
                    }
                    uy = uy + uji.conj() * y.get(j, k);
                }
                let b = sample_c(i + k, k, n);
                assert!((ux - b).magnitude() < 1e-10, "shift {k} row {i}");
                assert!((uy - b).magnitude() < 1e-10, "adjoint shift {k} row {i}");
            }
        }
    }
}

#[test]
fn test_level1_helpers() {
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 5, 3, |i, j| (i as f64 - 2.0) * (j + 1) as f64);
        let loc = max_abs_loc(&a)?;
        let norms = column_norms(&a)?.to_matrix()?;
        blas::row_swap(&mut a, 0, 4)?;
        blas::column_swap(&mut a, 0, 2)?;
        blas::shift_diagonal(&mut a, 10.0, 0);
        blas::scale(0.5, &mut a);
        Ok((loc, entries(&norms), a.to_matrix()?))
    });
    for (loc, norms, a) in results {
        // |i - 2| * (j + 1) is largest at rows 0 and 4 of column 2; the first wins
        assert_eq!((loc.i, loc.j, loc.value), (0, 2, 6.0));
        let base = (4.0 + 1.0 + 0.0 + 1.0 + 4.0f64).sqrt();
        assert_allclose_f64(&norms, &[base, 2.0 * base, 3.0 * base], 1e-12, 0.0, "column norms");
        // After both swaps, entry (0, 0) is the old (4, 2) plus the shift
        assert_eq!(a.get(0, 0), 0.5 * (2.0 * 3.0 + 10.0));
        assert_eq!(a.get(4, 2), 0.5 * -2.0);
        assert_eq!(a.get(1, 1), 0.5 * (-1.0 * 2.0 + 10.0));
    }
}
