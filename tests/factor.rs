//! Integration tests for the dense factorizations and their solves

mod common;

use common::{assert_allclose_f64, entries, matmul, on_grid, sample, sample_c, transpose};
use distla::blas::{Orientation, Side, UpperOrLower, make_trapezoidal, make_triangular};
use distla::lapack::{
    cholesky, cholesky_solve_after, ldl, ldl_multiply_after, ldl_solve_after, lq, lq_apply_q, lu, lu_full, lu_solve,
    qr, qr_apply_q, rq, rq_apply_q,
};
use distla::prelude::*;

/// Symmetric, diagonally dominant and therefore positive definite
fn spd(i: usize, j: usize, n: usize) -> f64 {
    sample(i.min(j), i.max(j), n)
}

fn swap_rows(m: &mut Matrix<f64>, a: usize, b: usize) {
    for j in 0..m.width() {
        let (x, y) = (m.get(a, j), m.get(b, j));
        m.set(a, j, y);
        m.set(b, j, x);
    }
}

fn swap_cols(m: &mut Matrix<f64>, a: usize, b: usize) {
    for i in 0..m.height() {
        let (x, y) = (m.get(i, a), m.get(i, b));
        m.set(i, a, y);
        m.set(i, b, x);
    }
}

/// Split packed LU factors into unit-lower `L` and upper `U`
fn unpack_lu(f: &Matrix<f64>) -> (Matrix<f64>, Matrix<f64>) {
    let (m, n) = (f.height(), f.width());
    let k = m.min(n);
    let l = Matrix::from_fn(m, k, |i, j| match i.cmp(&j) {
        std::cmp::Ordering::Greater => f.get(i, j),
        std::cmp::Ordering::Equal => 1.0,
        std::cmp::Ordering::Less => 0.0,
    });
    let u = Matrix::from_fn(k, n, |i, j| if i <= j { f.get(i, j) } else { 0.0 });
    (l, u)
}

#[test]
fn test_lu_partial_pivoting_residual() {
    let (m, n) = (8, 6);
    let init = |i: usize, j: usize| sample(j, i, m) * if i % 3 == 0 { 0.1 } else { 1.0 };
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, m, n, init);
        let p = lu(&mut a)?;
        assert_eq!(p.meta().pair(), (Dist::Vc, Dist::Star));
        Ok((a.to_matrix()?, p.to_matrix()?))
    });
    for (f, p) in results {
        let mut pa = Matrix::from_fn(m, n, init);
        for k in 0..p.height() {
            let target = p.get(k, 0) as usize;
            assert!(target >= k && target < m);
            swap_rows(&mut pa, k, target);
        }
        let (l, u) = unpack_lu(&f);
        for i in 0..m {
            for j in 0..i.min(n) {
                assert!(l.get(i, j).abs() <= 1.0 + 1e-12, "partial pivoting bounds L");
            }
        }
        assert_allclose_f64(&entries(&matmul(&l, &u)), &entries(&pa), 1e-12, 1e-12, "P A = L U");
    }
}

#[test]
fn test_lu_full_pivoting_residual() {
    let n = 6;
    let init = |i: usize, j: usize| sample(i, j, 2) * (1 + i + j) as f64;
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Vr, Dist::Star, n, n, init);
        let (p, q) = lu_full(&mut a)?;
        Ok((a.to_matrix()?, p.to_matrix()?, q.to_matrix()?))
    });
    for (f, p, q) in results {
        let mut paq = Matrix::from_fn(n, n, init);
        for k in 0..n {
            swap_rows(&mut paq, k, p.get(k, 0) as usize);
            swap_cols(&mut paq, k, q.get(k, 0) as usize);
        }
        let (l, u) = unpack_lu(&f);
        for i in 0..n {
            for j in i..n {
                assert!(u.get(i, i).abs() + 1e-12 >= u.get(i, j).abs() || j == i, "full pivoting bounds U");
            }
        }
        assert_allclose_f64(&entries(&matmul(&l, &u)), &entries(&paq), 1e-11, 1e-11, "P A Qᵀ = L U");
    }
}

#[test]
fn test_lu_solve_and_singular_pivot() {
    let n = 7;
    let results = on_grid(6, |env, grid| {
        let _bs = env.scoped_block_size(3);
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| sample(i, j, n));
        let mut b = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 2, |i, j| (i + 3 * j) as f64);
        lu_solve(&mut a, &mut b)?;

        let mut singular = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 4, 4, |i, j| if j == 2 { 0.0 } else { sample(i, j, 4) });
        let err = lu(&mut singular).unwrap_err();
        Ok((b.to_matrix()?, err))
    });
    let a = Matrix::from_fn(n, n, |i, j| sample(i, j, n));
    let rhs = Matrix::from_fn(n, 2, |i, j| (i + 3 * j) as f64);
    for (x, err) in results {
        assert_allclose_f64(&entries(&matmul(&a, &x)), &entries(&rhs), 1e-10, 1e-10, "A X = B");
        assert!(matches!(err, Error::SingularPivot { index: 2 }), "{err:?}");
        assert!(err.is_numerical());
    }
}

#[test]
fn test_cholesky_both_triangles() {
    let n = 9;
    let results = on_grid(6, |_, grid| {
        let mut lower = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| spd(i, j, n));
        cholesky(UpperOrLower::Lower, &mut lower)?;
        make_triangular(UpperOrLower::Lower, &mut lower);

        let mut upper = DistMatrix::from_fn(&grid, Dist::Star, Dist::Vc, n, n, |i, j| spd(i, j, n));
        cholesky(UpperOrLower::Upper, &mut upper)?;
        make_triangular(UpperOrLower::Upper, &mut upper);

        let mut not_spd = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, 3, 3, |i, j| if i == j { 1.0 - i as f64 } else { 0.0 });
        let err = cholesky(UpperOrLower::Lower, &mut not_spd).unwrap_err();
        Ok((lower.to_matrix()?, upper.to_matrix()?, err))
    });
    let a = Matrix::from_fn(n, n, |i, j| spd(i, j, n));
    for (l, u, err) in results {
        assert_allclose_f64(&entries(&matmul(&l, &transpose(&l))), &entries(&a), 1e-12, 1e-12, "L Lᵀ");
        assert_allclose_f64(&entries(&matmul(&transpose(&u), &u)), &entries(&a), 1e-12, 1e-12, "Uᵀ U");
        assert!(matches!(err, Error::NotPositiveDefinite { index: 1 }), "{err:?}");
    }
}

#[test]
fn test_cholesky_solve() {
    let n = 6;
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| spd(i, j, n));
        cholesky(UpperOrLower::Upper, &mut a)?;
        let mut b = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 3, |i, j| sample(i, j, n));
        cholesky_solve_after(UpperOrLower::Upper, &a, &mut b)?;
        Ok(b.to_matrix()?)
    });
    let a = Matrix::from_fn(n, n, |i, j| spd(i, j, n));
    let rhs = Matrix::from_fn(n, 3, |i, j| sample(i, j, n));
    for x in results {
        assert_allclose_f64(&entries(&matmul(&a, &x)), &entries(&rhs), 1e-10, 1e-10, "A X = B");
    }
}

#[test]
fn test_ldl_factor_multiply_solve() {
    let n = 7;
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| spd(i, j, n) - if i == j { 3.0 } else { 0.0 });
        let d = ldl(false, &mut a)?;
        assert_eq!(d.meta().pair(), (Dist::Md, Dist::Star));
        let mut prod = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 2, |i, j| (i * j + 1) as f64);
        ldl_multiply_after(false, &a, &d, &mut prod)?;
        let mut solved = prod.clone();
        ldl_solve_after(false, &a, &d, &mut solved)?;
        Ok((a.to_matrix()?, d.to_matrix()?, prod.to_matrix()?, solved.to_matrix()?))
    });
    let a = Matrix::from_fn(n, n, |i, j| spd(i, j, n) - if i == j { 3.0 } else { 0.0 });
    let b = Matrix::from_fn(n, 2, |i, j| (i * j + 1) as f64);
    for (f, d, prod, solved) in results {
        let l = Matrix::from_fn(n, n, |i, j| match i.cmp(&j) {
            std::cmp::Ordering::Greater => f.get(i, j),
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Less => 0.0,
        });
        let ld = Matrix::from_fn(n, n, |i, j| l.get(i, j) * d.get(j, 0));
        for k in 0..n {
            assert_eq!(f.get(k, k), d.get(k, 0), "D stays on the diagonal");
        }
        assert_allclose_f64(&entries(&matmul(&ld, &transpose(&l))), &entries(&a), 1e-12, 1e-12, "L D Lᵀ");
        assert_allclose_f64(&entries(&prod), &entries(&matmul(&a, &b)), 1e-12, 1e-12, "multiply");
        assert_allclose_f64(&entries(&solved), &entries(&b), 1e-10, 1e-10, "solve undoes multiply");
    }
}

#[test]
fn test_qr_reconstructs_and_q_is_orthogonal() {
    let (m, n) = (9, 5);
    let init = |i: usize, j: usize| sample(i, j, 3);
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, m, n, init);
        let t = qr(&mut a)?;
        assert_eq!(t.height(), n);

        let mut r = a.clone();
        make_trapezoidal(UpperOrLower::Upper, &mut r, 0);
        let r_local = r.to_matrix()?;
        qr_apply_q(Side::Left, Orientation::Normal, &a, &t, &mut r)?;

        let mut b = DistMatrix::from_fn(&grid, Dist::Vc, Dist::Star, 3, m, |i, j| (i + j) as f64);
        qr_apply_q(Side::Right, Orientation::Adjoint, &a, &t, &mut b)?;
        let mixed = b.to_matrix()?;
        qr_apply_q(Side::Right, Orientation::Normal, &a, &t, &mut b)?;
        Ok((r_local, r.to_matrix()?, mixed, b.to_matrix()?))
    });
    let a = Matrix::from_fn(m, n, init);
    let b = Matrix::from_fn(3, m, |i, j| (i + j) as f64);
    for (r, qr_prod, mixed, restored) in results {
        for j in 0..n {
            for i in j + 1..m {
                assert_eq!(r.get(i, j), 0.0);
            }
        }
        assert_allclose_f64(&entries(&qr_prod), &entries(&a), 1e-12, 1e-12, "Q R = A");
        // Orthogonal maps keep row norms
        for i in 0..3 {
            let before: f64 = (0..m).map(|j| b.get(i, j).powi(2)).sum();
            let after: f64 = (0..m).map(|j| mixed.get(i, j).powi(2)).sum();
            assert!((before - after).abs() < 1e-10 * before);
        }
        assert_allclose_f64(&entries(&restored), &entries(&b), 1e-12, 1e-12, "B Qᴴ Q = B");
    }
}

#[test]
fn test_complex_qr_rejects_plain_transpose() {
    let n = 4;
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, n, |i, j| sample_c(i, j, n));
        let t = qr(&mut a)?;
        let mut b = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 1, |i, _| sample_c(i, 0, n));
        let rejected = matches!(
            qr_apply_q(Side::Left, Orientation::Transpose, &a, &t, &mut b),
            Err(Error::NotImplemented { .. })
        );
        qr_apply_q(Side::Left, Orientation::Adjoint, &a, &t, &mut b)?;
        qr_apply_q(Side::Left, Orientation::Normal, &a, &t, &mut b)?;
        Ok((rejected, b.to_matrix()?))
    });
    for (rejected, b) in results {
        assert!(rejected);
        for i in 0..n {
            assert!((b.get(i, 0) - sample_c(i, 0, n)).magnitude() < 1e-12);
        }
    }
}

#[test]
fn test_rq_reconstructs() {
    let (m, n) = (4, 7);
    let init = |i: usize, j: usize| sample(j, i, 4);
    let results = on_grid(6, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, m, n, init);
        let t = rq(&mut a)?;
        let mut r = a.clone();
        make_trapezoidal(UpperOrLower::Upper, &mut r, (n - m) as isize);
        rq_apply_q(Side::Right, Orientation::Normal, &a, &t, &mut r)?;
        Ok(r.to_matrix()?)
    });
    let a = Matrix::from_fn(m, n, init);
    for rq_prod in results {
        assert_allclose_f64(&entries(&rq_prod), &entries(&a), 1e-12, 1e-12, "R Q = A");
    }
}

#[test]
fn test_lq_reconstructs_and_round_trips() {
    let (m, n) = (5, 8);
    let init = |i: usize, j: usize| sample(i, j, 2) + 0.25 * j as f64;
    let results = on_grid(4, |_, grid| {
        let mut a = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, m, n, init);
        let t = lq(&mut a)?;
        let mut l = a.clone();
        make_trapezoidal(UpperOrLower::Lower, &mut l, 0);
        lq_apply_q(Side::Right, Orientation::Normal, &a, &t, &mut l)?;

        let mut b = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, n, 2, |i, j| sample(i, j, n));
        lq_apply_q(Side::Left, Orientation::Normal, &a, &t, &mut b)?;
        lq_apply_q(Side::Left, Orientation::Adjoint, &a, &t, &mut b)?;
        Ok((l.to_matrix()?, b.to_matrix()?))
    });
    let a = Matrix::from_fn(m, n, init);
    let b = Matrix::from_fn(n, 2, |i, j| sample(i, j, n));
    for (lq_prod, round_trip) in results {
        assert_allclose_f64(&entries(&lq_prod), &entries(&a), 1e-12, 1e-12, "L Q = A");
        assert_allclose_f64(&entries(&round_trip), &entries(&b), 1e-12, 1e-12, "Qᴴ Q B = B");
    }
}
