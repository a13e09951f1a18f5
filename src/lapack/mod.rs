//! Distributed dense factorizations and the routines built on them
//!
//! Every factorization works on an `[MC,MR]` matrix in place. Operands in
//! another layout are copied into `[MC,MR]`, factored there and copied back,
//! so callers may pass any layout.
//!
//! The factorizations are unblocked right-looking sweeps: each step moves
//! one column (or row) into a `[MC,STAR]` or `[STAR,MR]` panel aligned with
//! the trailing matrix, after which the trailing update is a purely local
//! rank-one kernel call.

mod cholesky;
mod determinant;
mod householder;
mod ldl;
mod lq;
mod lu;
mod norm;
mod pseudospectrum;
mod qr;
mod rq;

pub use cholesky::{cholesky, cholesky_solve_after};
pub use determinant::{SafeProduct, determinant, hpd_determinant, safe_determinant, safe_hpd_determinant};
pub use ldl::{ldl, ldl_multiply_after, ldl_solve_after};
pub use lq::{lq, lq_apply_q};
pub use lu::{lu, lu_full, lu_solve, lu_solve_after};
pub use norm::{
    NormType, frobenius_norm, hermitian_frobenius_norm, hermitian_infinity_norm, hermitian_max_norm, hermitian_norm,
    hermitian_one_norm, infinity_norm, max_norm, norm, one_norm,
};
pub use pseudospectrum::{PseudospecCtrl, Pseudospectrum, triangular_power, triangular_pseudospectrum};
pub use qr::{qr, qr_apply_q};
pub use rq::{rq, rq_apply_q};

use crate::blas::{UpperOrLower, local};
use crate::dist::{Dist, DistMeta};
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite, window};
use crate::dtype::{Element, Field};
use crate::error::Result;
use crate::redist;

/// Metadata of the `h × w` window of `meta` at (i, j)
pub(crate) fn window_meta(meta: &DistMeta, i: usize, j: usize, h: usize, w: usize) -> DistMeta {
    window(meta, i, j, h, w).0
}

/// `src` laid out as `[col,row]`, aligned with `like` wherever the two
/// layouts share a distribution
pub(crate) fn spread<T, S>(src: &S, col: Dist, row: Dist, like: &DistMeta) -> Result<DistMatrix<T>>
where
    T: Element,
    S: DistRead<T> + ?Sized,
{
    let mut out = DistMatrix::new(src.grid(), col, row);
    out.align_with(like);
    out.assign(src)?;
    Ok(out)
}

/// Like [`spread`] for `srcᵀ` (or `srcᴴ`)
pub(crate) fn spread_transposed<T, S>(src: &S, col: Dist, row: Dist, like: &DistMeta, conjugate: bool) -> Result<DistMatrix<T>>
where
    T: Field,
    S: DistRead<T> + ?Sized,
{
    let mut out = DistMatrix::new(src.grid(), col, row);
    out.align_with(like);
    redist::transpose_into(src, &mut out, conjugate)?;
    Ok(out)
}

/// The local entries of a `[STAR,MR]` row vector
pub(crate) fn row_values<T: Element>(row: &DistMatrix<T>) -> Vec<T> {
    let local = row.local();
    if local.height() == 0 {
        return Vec::new();
    }
    (0..local.width()).map(|jl| local.get(0, jl)).collect()
}

/// `A += α x y` where `x` is a `[MC,STAR]` column and `y` holds the local
/// entries of a `[STAR,MR]` row, both aligned with `A`
///
/// With `triangle` set only that triangle of `A` is written, which is how the
/// symmetric factorizations leave the opposite triangle of their input
/// untouched.
pub(crate) fn rank_one_update<T, A>(alpha: T, x: &DistMatrix<T>, y: &[T], a: &mut A, triangle: Option<UpperOrLower>)
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let xl = x.local().col(0);
    let Some(uplo) = triangle else {
        local::ger(alpha, xl, y, a.local_mut());
        return;
    };
    let meta = a.meta().clone();
    let (rows, cols) = meta.my_spans();
    let mut al = a.local_mut();
    for jl in 0..cols.len {
        let j = cols.global(jl);
        let t = alpha * y[jl];
        for il in 0..rows.len {
            let i = rows.global(il);
            let inside = match uplo {
                UpperOrLower::Lower => i >= j,
                UpperOrLower::Upper => i <= j,
            };
            if inside {
                al.update(il, jl, xl[il] * t);
            }
        }
    }
}

/// Run `f` on `a` viewed as `[MC,MR]`
///
/// If `a` is in another layout it is copied out, and the (possibly
/// partially updated) copy is written back even when `f` fails.
pub(crate) fn in_mc_mr<T, A, R>(a: &mut A, f: impl FnOnce(&mut DistMatrix<T>) -> Result<R>) -> Result<R>
where
    T: Field,
    A: DistWrite<T> + ?Sized,
{
    let mut tmp = DistMatrix::new(a.grid(), Dist::Mc, Dist::Mr);
    tmp.assign(&*a)?;
    let out = f(&mut tmp);
    a.as_view_mut().assign(&tmp)?;
    out
}
