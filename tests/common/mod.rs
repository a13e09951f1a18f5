//! Common test utilities
#![allow(dead_code)]

use distla::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

/// Install a per-thread subscriber that writes through the test harness
pub fn init_test_subscriber() -> tracing::subscriber::DefaultGuard {
    let fmt_layer = fmt::layer().with_target(true).with_test_writer();

    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .set_default()
}

/// Run `f` once per rank on `p` threads and return the results in rank order
///
/// Receives time out, so a rank that panics makes its peers fail instead of
/// hanging the test.
pub fn spmd<R, F>(p: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(Environment) -> Result<R> + Sync,
{
    let config = Config {
        recv_timeout: Some(Duration::from_secs(30)),
        ..Config::default()
    };
    let envs = Environment::universe(p, config);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = envs
            .into_iter()
            .map(|env| {
                s.spawn(move || {
                    let _guard = init_test_subscriber();
                    f(env)
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle.join() {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => panic!("rank {rank} failed: {err}"),
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// [`spmd`] with the default grid over all `p` ranks
pub fn on_grid<R, F>(p: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&Environment, Arc<Grid>) -> Result<R> + Sync,
{
    spmd(p, |env| {
        let grid = env.default_grid()?;
        f(&env, grid)
    })
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Column-major entries of a local matrix
pub fn entries<T: Element>(m: &Matrix<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(m.height() * m.width());
    for j in 0..m.width() {
        for i in 0..m.height() {
            out.push(m.get(i, j));
        }
    }
    out
}

/// A well-conditioned deterministic test matrix
///
/// Off-diagonal entries lie in [-1, 1]; square matrices get a diagonal
/// that dominates their rows.
pub fn sample(i: usize, j: usize, n: usize) -> f64 {
    let base = (((i * 7 + j * 13 + 3) % 17) as f64 - 8.0) / 8.0;
    if i == j { base + n as f64 + 1.0 } else { base }
}

/// A complex variant of [`sample`]
pub fn sample_c(i: usize, j: usize, n: usize) -> Complex128 {
    let im = (((i * 5 + j * 3 + 1) % 11) as f64 - 5.0) / 5.0;
    Complex128::new(sample(i, j, n), if i == j { 0.0 } else { im })
}

/// `op(A) op(B)` on local matrices
pub fn matmul(a: &Matrix<f64>, b: &Matrix<f64>) -> Matrix<f64> {
    assert_eq!(a.width(), b.height());
    Matrix::from_fn(a.height(), b.width(), |i, j| {
        (0..a.width()).map(|k| a.get(i, k) * b.get(k, j)).sum()
    })
}

/// Transpose of a local matrix
pub fn transpose(a: &Matrix<f64>) -> Matrix<f64> {
    Matrix::from_fn(a.width(), a.height(), |i, j| a.get(j, i))
}
