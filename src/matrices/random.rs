//! Random matrices
//!
//! Each process draws its own entries from the generator it is handed. When
//! the layout replicates entries (any `STAR` or `MD` component), the first
//! process of each redundant group draws and broadcasts, so the copies agree.

use crate::blas::{UpperOrLower, make_hermitian};
use crate::dist_matrix::{DistMatrix, DistRead, DistWrite};
use crate::dtype::{Element, Field};
use crate::error::Result;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::{FRAC_1_SQRT_2, TAU};

/// A normal sample with the given mean and standard deviation
///
/// Complex samples split the variance evenly between the real and imaginary
/// parts.
pub(crate) fn sample_normal<T: Field, R: Rng + ?Sized>(mean: T, stddev: T::Real, rng: &mut R) -> T {
    let sigma = stddev.to_f64();
    let z: f64 = StandardNormal.sample(rng);
    if T::IS_COMPLEX {
        let w: f64 = StandardNormal.sample(rng);
        let s = sigma * FRAC_1_SQRT_2;
        mean + T::from_parts(
            <T::Real as Element>::from_f64(s * z),
            <T::Real as Element>::from_f64(s * w),
        )
    } else {
        mean + T::from_f64(sigma * z)
    }
}

/// A sample uniform over the ball of `radius` around `center`: an interval
/// for real types, a disk for complex ones
fn sample_ball<T: Field, R: Rng + ?Sized>(center: T, radius: T::Real, rng: &mut R) -> T {
    let r = radius.to_f64();
    if T::IS_COMPLEX {
        let rho = r * rng.random::<f64>().sqrt();
        let theta = TAU * rng.random::<f64>();
        center
            + T::from_parts(
                <T::Real as Element>::from_f64(rho * theta.cos()),
                <T::Real as Element>::from_f64(rho * theta.sin()),
            )
    } else {
        center + T::from_f64(r * (2.0 * rng.random::<f64>() - 1.0))
    }
}

/// Fill the local entries with `draw`, drawing once per redundant group
fn fill_random<T: Element>(a: &mut DistMatrix<T>, mut draw: impl FnMut() -> T) -> Result<()> {
    let meta = a.meta().clone();
    if !meta.participating() {
        return Ok(());
    }
    let redundant = meta.redundant_comm();
    if redundant.rank() == 0 {
        let mut local = a.local_mut();
        for jl in 0..local.width() {
            for il in 0..local.height() {
                local.set(il, jl, draw());
            }
        }
    }
    if redundant.size() > 1 {
        let mut packed = Vec::with_capacity(meta.local_height() * meta.local_width());
        a.local().pack_into(&mut packed);
        redundant.broadcast(&mut packed, 0)?;
        a.local_mut().unpack_from(&packed);
    }
    Ok(())
}

/// `m × n` matrix with entries uniform over the ball of `radius` around
/// `center`
pub fn uniform<T, R>(a: &mut DistMatrix<T>, m: usize, n: usize, center: T, radius: T::Real, rng: &mut R) -> Result<()>
where
    T: Field,
    R: Rng + ?Sized,
{
    a.resize(m, n);
    fill_random(a, || sample_ball(center, radius, rng))
}

/// `m × n` matrix with normally distributed entries
pub fn gaussian<T, R>(a: &mut DistMatrix<T>, m: usize, n: usize, mean: T, stddev: T::Real, rng: &mut R) -> Result<()>
where
    T: Field,
    R: Rng + ?Sized,
{
    a.resize(m, n);
    fill_random(a, || sample_normal(mean, stddev, rng))
}

/// `n × n` Wigner matrix: Hermitian with normally distributed entries
///
/// The lower triangle is drawn and mirrored, so the diagonal is real.
pub fn wigner<T, R>(a: &mut DistMatrix<T>, n: usize, mean: T, stddev: T::Real, rng: &mut R) -> Result<()>
where
    T: Field,
    R: Rng + ?Sized,
{
    gaussian(a, n, n, mean, stddev, rng)?;
    make_hermitian(UpperOrLower::Lower, a)
}
