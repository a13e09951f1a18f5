//! Pseudospectra of upper-triangular matrices by inverse power iteration
//!
//! For each shift σ the estimate is `‖(U − σI)⁻¹‖₂`, computed by running
//! inverse iteration on `(U − σI)⁻ᴴ (U − σI)⁻¹` for every shift at once:
//! one column of an `n × s` block per shift, advanced by two multi-shift
//! triangular solves per sweep. Shifts whose estimate has settled can be
//! deflated out of the active block.
//!
//! The bookkeeping (shifts, estimates, iteration counts and the pivot
//! history) is small and replicated on every process, so every process
//! makes the same convergence and deflation decisions.

use crate::blas::{Orientation, Side, UpperOrLower, column_norms, column_swap, multi_shift_trsm};
use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::{Element, Field, RealField};
use crate::env::default_seed;
use crate::error::{Error, Result};
use crate::grid::CommKind;
use crate::matrices::{gaussian, sample_normal};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;

/// Controls for [`triangular_power`] and [`triangular_pseudospectrum`]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PseudospecCtrl<R> {
    /// Move converged shifts out of the active block
    pub deflate: bool,
    /// Sweep limit; reaching it with unconverged shifts is an error
    pub max_its: usize,
    /// Relative change below which an estimate counts as converged
    pub tol: R,
    /// Log one `info` event per sweep
    pub progress: bool,
    /// Base seed for the starting vectors; each process mixes in its rank
    pub seed: Option<u64>,
}

impl<R: RealField> Default for PseudospecCtrl<R> {
    fn default() -> Self {
        Self {
            deflate: true,
            max_its: 1000,
            tol: R::from_f64(1e-6),
            progress: false,
            seed: None,
        }
    }
}

/// Inverse-norm and iteration-count maps over a rectangle of the complex
/// plane
///
/// Entry (i, j) belongs to the shift in row `i` counted from the top
/// (largest imaginary part) and column `j` counted from the left.
#[derive(Clone, Debug)]
pub struct Pseudospectrum<T: Field> {
    /// `‖(U − σI)⁻¹‖₂` estimates as an `[MC,MR]` matrix
    pub inv_norm_map: DistMatrix<T::Real>,
    /// Sweeps each shift needed
    pub it_count_map: DistMatrix<i64>,
    /// Center of the sampled rectangle
    pub center: T,
    /// Extent along the real axis
    pub real_width: T::Real,
    /// Extent along the imaginary axis
    pub imag_width: T::Real,
}

/// Estimates are capped at `1/ε`, the largest inverse norm that means
/// anything in working precision
fn norm_cap<R: RealField>() -> R {
    R::one() / R::epsilon_val()
}

fn cap_estimate<R: RealField>(est: R, cap: R) -> R {
    if est.is_nan_val() || est >= cap { cap } else { est }
}

/// Which active estimates have settled; the others get one more sweep
/// counted
fn find_converged<R: RealField>(last: &[R], curr: &[R], it_counts: &mut [i64], tol: R) -> Vec<bool> {
    let cap = norm_cap::<R>();
    let zero = R::zero();
    curr.iter()
        .zip(last)
        .zip(it_counts.iter_mut())
        .map(|((&c, &l), count)| {
            let converged = if c >= cap {
                true
            } else if c.abs_val() > zero {
                (l - c).abs_val() / c.abs_val() <= tol
            } else {
                false
            };
            if !converged {
                *count += 1;
            }
            converged
        })
        .collect()
}

/// The swaps that move every converged entry to the tail, walking back
/// from the end
fn deflation_swaps(converged: &[bool]) -> Vec<(usize, usize)> {
    let mut swaps = Vec::new();
    let mut tail = converged.len();
    for from in (0..converged.len()).rev() {
        if converged[from] {
            tail -= 1;
            if tail != from {
                swaps.push((from, tail));
            }
        }
    }
    swaps
}

/// Normalize every column of `X` to unit two-norm
///
/// A zero column is replaced by a fresh Gaussian one first. Collective over
/// `MC` per column, which keeps each process column in step.
fn fix_columns<T, X, R>(x: &mut X, rng: &mut R) -> Result<()>
where
    T: Field,
    X: DistWrite<T> + ?Sized,
    R: Rng + ?Sized,
{
    let norms = column_norms(&*x)?;
    if !x.meta().participating() {
        return Ok(());
    }
    let mc = x.grid().comm(CommKind::Mc).clone();
    let zero = <T::Real as Element>::zero();
    let one = <T::Real as Element>::one();
    let mut local = x.local_mut();
    for jl in 0..local.width() {
        let mut norm = norms.get_local(jl, 0);
        if norm == zero {
            let col = local.col_mut(jl);
            col.iter_mut().for_each(|v| *v = sample_normal(T::zero(), one, rng));
            let mut ssq = [col.iter().fold(zero, |acc, v| acc + v.abs_sq())];
            mc.all_reduce_sum(&mut ssq)?;
            norm = ssq[0].sqrt_val();
        }
        let inv = T::from_real(one / norm);
        local.col_mut(jl).iter_mut().for_each(|v| *v = *v * inv);
    }
    Ok(())
}

/// Replicated results of the power iteration, in the order the shifts were given
struct PowerOutcome<R> {
    estimates: Vec<R>,
    it_counts: Vec<i64>,
}

fn power_iteration<T, U>(u: &U, mut shifts: Vec<T>, ctrl: &PseudospecCtrl<T::Real>) -> Result<PowerOutcome<T::Real>>
where
    T: Field,
    U: DistRead<T> + ?Sized,
{
    let n = u.height();
    let count = shifts.len();
    let grid = Arc::clone(u.grid());
    let zero = <T::Real as Element>::zero();
    let cap = norm_cap::<T::Real>();

    let mut preimage: Vec<usize> = (0..count).collect();
    let mut estimates = vec![zero; count];
    let mut last = vec![zero; count];
    let mut it_counts = vec![1i64; count];
    if n == 0 || count == 0 {
        return Ok(PowerOutcome { estimates, it_counts });
    }

    let vc = grid.vc_rank().unwrap_or(0);
    let seed = ctrl.seed.map_or_else(|| default_seed(vc), |base| base ^ default_seed(vc));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = DistMatrix::new(&grid, Dist::Mc, Dist::Mr);
    gaussian(&mut x, n, count, T::zero(), <T::Real as Element>::one(), &mut rng)?;
    fix_columns(&mut x, &mut rng)?;

    let report = ctrl.progress && vc == 0;
    let (mut its, mut done) = (0usize, 0usize);
    loop {
        let active = if ctrl.deflate { count - done } else { count };
        let started = Instant::now();
        let norms = {
            let sigma = DistMatrix::from_fn(&grid, Dist::Star, Dist::Star, active, 1, |i, _| shifts[i]);
            let mut xa = x.view_mut(0, 0, n, active);
            multi_shift_trsm(
                Side::Left,
                UpperOrLower::Upper,
                Orientation::Normal,
                T::one(),
                u,
                &sigma,
                &mut xa,
            )?;
            fix_columns(&mut xa, &mut rng)?;
            multi_shift_trsm(
                Side::Left,
                UpperOrLower::Upper,
                Orientation::Adjoint,
                T::one(),
                u,
                &sigma,
                &mut xa,
            )?;
            column_norms(&xa)?.to_matrix()?
        };
        for (k, est) in estimates[..active].iter_mut().enumerate() {
            *est = cap_estimate(norms.get(k, 0), cap);
        }

        let converged = find_converged(&last[..active], &estimates[..active], &mut it_counts[..active], ctrl.tol);
        let active_done = converged.iter().filter(|&&c| c).count();
        done = if ctrl.deflate { done + active_done } else { active_done };
        if report {
            tracing::info!(
                iteration = its,
                seconds = started.elapsed().as_secs_f64(),
                converged = done,
                total = count,
                "pseudospectrum sweep"
            );
        }

        its += 1;
        if its >= ctrl.max_its || done == count {
            break;
        }
        if ctrl.deflate && active_done != 0 {
            let mut xa = x.view_mut(0, 0, n, active);
            for (from, to) in deflation_swaps(&converged) {
                shifts.swap(from, to);
                preimage.swap(from, to);
                estimates.swap(from, to);
                it_counts.swap(from, to);
                column_swap(&mut xa, from, to)?;
            }
            tracing::debug!(deflated = active_done, remaining = count - done, "deflated converged shifts");
        }
        last.copy_from_slice(&estimates);
    }
    if done != count {
        return Err(Error::NoConvergence {
            converged: done,
            total: count,
            iterations: its,
        });
    }

    let mut ordered = PowerOutcome {
        estimates: vec![zero; count],
        it_counts: vec![0; count],
    };
    for (j, &dest) in preimage.iter().enumerate() {
        ordered.estimates[dest] = estimates[j];
        ordered.it_counts[dest] = it_counts[j];
    }
    Ok(ordered)
}

/// Estimate `‖(U − σⱼI)⁻¹‖₂` for every shift of the column vector `shifts`
///
/// `U` is upper triangular; its strictly lower triangle is ignored. Returns
/// the estimates and the number of sweeps each shift took, both as
/// `[VR,STAR]` vectors in the order of `shifts`. Estimates are capped at
/// `1/ε`, so a shift on an eigenvalue converges immediately.
///
/// Fails with [`Error::NoConvergence`] if some shift has not settled after
/// `ctrl.max_its` sweeps.
pub fn triangular_power<T, U, S>(
    u: &U,
    shifts: &S,
    ctrl: &PseudospecCtrl<T::Real>,
) -> Result<(DistMatrix<T::Real>, DistMatrix<i64>)>
where
    T: Field,
    U: DistRead<T> + ?Sized,
    S: DistRead<T> + ?Sized,
{
    let n = u.height();
    assert_eq!(u.width(), n, "the triangular operand must be square, got {n}x{}", u.width());
    assert_eq!(shifts.width(), 1, "shifts must be a column vector");
    let count = shifts.height();
    let gathered = shifts.to_matrix()?;
    let grid = Arc::clone(u.grid());
    if !grid.in_grid() {
        return Ok((
            DistMatrix::with_shape(&grid, Dist::Vr, Dist::Star, count, 1),
            DistMatrix::with_shape(&grid, Dist::Vr, Dist::Star, count, 1),
        ));
    }
    let values = (0..count).map(|k| gathered.get(k, 0)).collect();
    let outcome = power_iteration(u, values, ctrl)?;
    Ok((
        DistMatrix::from_fn(&grid, Dist::Vr, Dist::Star, count, 1, |i, _| outcome.estimates[i]),
        DistMatrix::from_fn(&grid, Dist::Vr, Dist::Star, count, 1, |i, _| outcome.it_counts[i]),
    ))
}

/// Sample the pseudospectrum of the upper-triangular `U` on an
/// `imag_size × real_size` grid of shifts
///
/// The rectangle is centered at `center` and spans `real_width` by
/// `imag_width`; shifts sit at the centers of the cells. A zero width is
/// replaced by `2.2 · max |uᵢᵢ − center|` (or 1 if every eigenvalue sits on
/// the center), so the rectangle covers the spectrum with a margin.
pub fn triangular_pseudospectrum<T, U>(
    u: &U,
    center: T,
    real_width: T::Real,
    imag_width: T::Real,
    real_size: usize,
    imag_size: usize,
    ctrl: &PseudospecCtrl<T::Real>,
) -> Result<Pseudospectrum<T>>
where
    T: Field,
    U: DistRead<T> + ?Sized,
{
    if !T::IS_COMPLEX {
        return Err(Error::invalid_argument(
            "u",
            "shifts off the real axis need a complex element type",
        ));
    }
    assert!(real_size > 0 && imag_size > 0, "the shift grid must not be empty");
    let n = u.height();
    assert_eq!(u.width(), n, "the triangular operand must be square, got {n}x{}", u.width());

    let zero = <T::Real as Element>::zero();
    let (real_width, imag_width) = if real_width == zero || imag_width == zero {
        let diag = u.get_diagonal(0)?.to_matrix()?;
        let radius = (0..diag.height()).fold(zero, |acc, k| acc.max_val((diag.get(k, 0) - center).abs_val()));
        let auto = if radius == zero {
            <T::Real as Element>::one()
        } else {
            <T::Real as Element>::from_f64(2.2) * radius
        };
        tracing::debug!(width = auto.to_f64(), "chose the pseudospectrum window from the spectrum");
        (
            if real_width == zero { auto } else { real_width },
            if imag_width == zero { auto } else { imag_width },
        )
    } else {
        (real_width, imag_width)
    };

    let (re0, im0) = (center.real_part().to_f64(), center.imag_part().to_f64());
    let (rw, iw) = (real_width.to_f64(), imag_width.to_f64());
    let shifts: Vec<T> = (0..real_size * imag_size)
        .map(|k| {
            let (i, j) = (k % imag_size, k / imag_size);
            let re = re0 - rw / 2.0 + (j as f64 + 0.5) * rw / real_size as f64;
            let im = im0 + iw / 2.0 - (i as f64 + 0.5) * iw / imag_size as f64;
            T::from_parts(<T::Real as Element>::from_f64(re), <T::Real as Element>::from_f64(im))
        })
        .collect();

    let grid = Arc::clone(u.grid());
    let outcome = if grid.in_grid() {
        power_iteration(u, shifts, ctrl)?
    } else {
        PowerOutcome {
            estimates: Vec::new(),
            it_counts: Vec::new(),
        }
    };
    let inv_norm_map = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, imag_size, real_size, |i, j| {
        outcome.estimates[i + j * imag_size]
    });
    let it_count_map = DistMatrix::from_fn(&grid, Dist::Mc, Dist::Mr, imag_size, real_size, |i, j| {
        outcome.it_counts[i + j * imag_size]
    });
    Ok(Pseudospectrum {
        inv_norm_map,
        it_count_map,
        center,
        real_width,
        imag_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_converged_counts_unsettled() {
        let last = [0.0, 1.0, 5.0];
        let curr = [2.0, 1.0 + 1e-9, f64::MAX];
        let mut counts = [1, 1, 1];
        let converged = find_converged(&last, &curr, &mut counts, 1e-6);
        assert_eq!(converged, vec![false, true, true]);
        assert_eq!(counts, [2, 1, 1]);
    }

    #[test]
    fn test_zero_estimate_never_converges() {
        let mut counts = [3];
        assert_eq!(find_converged(&[0.0], &[0.0], &mut counts, 1e-6), vec![false]);
        assert_eq!(counts, [4]);
    }

    #[test]
    fn test_cap_estimate() {
        let cap = norm_cap::<f64>();
        assert_eq!(cap_estimate(f64::NAN, cap), cap);
        assert_eq!(cap_estimate(f64::INFINITY, cap), cap);
        assert_eq!(cap_estimate(2.0, cap), 2.0);
    }

    #[test]
    fn test_deflation_swaps_move_converged_to_tail() {
        let converged = [true, false, true, false];
        let swaps = deflation_swaps(&converged);
        assert_eq!(swaps, vec![(2, 3), (0, 2)]);

        let mut order = vec![0, 1, 2, 3];
        for (from, to) in swaps {
            order.swap(from, to);
        }
        assert_eq!(&order[2..], &[0, 2]);
        assert!(deflation_swaps(&[false, true]).is_empty());
    }

    #[test]
    fn test_default_ctrl() {
        let ctrl = PseudospecCtrl::<f64>::default();
        assert!(ctrl.deflate);
        assert_eq!(ctrl.max_its, 1000);
        assert_eq!(ctrl.tol, 1e-6);
        assert!(!ctrl.progress);
    }
}
