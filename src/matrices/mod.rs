//! Test and demo matrix generators
//!
//! Every generator resizes its target and overwrites all entries, keeping the
//! target's layout and alignments. The deterministic ones are purely local:
//! each process fills its own entries from the global indices. The random
//! ones live in [`random`] and keep replicated copies consistent.

mod random;

pub use random::{gaussian, uniform, wigner};
pub(crate) use random::sample_normal;

use crate::blas::{fill, set_diagonal, zero};
use crate::dist_matrix::DistMatrix;
use crate::dtype::{Element, Field};

/// `m × n` matrix of zeros
pub fn zeros<T: Element>(a: &mut DistMatrix<T>, m: usize, n: usize) {
    a.resize(m, n);
    zero(a);
}

/// `m × n` matrix of ones
pub fn ones<T: Element>(a: &mut DistMatrix<T>, m: usize, n: usize) {
    a.resize(m, n);
    fill(a, T::one());
}

/// `m × n` matrix with ones on the main diagonal
pub fn identity<T: Element>(a: &mut DistMatrix<T>, m: usize, n: usize) {
    zeros(a, m, n);
    set_diagonal(a, T::one(), 0);
}

/// Square matrix with `d` on its diagonal
pub fn diagonal<T: Element>(a: &mut DistMatrix<T>, d: &[T]) {
    let n = d.len();
    a.resize(n, n);
    a.fill_with(|i, j| if i == j { d[i] } else { T::zero() });
}

/// `m × n` Hankel matrix, `A(i, j) = values[i + j]`
///
/// # Panics
/// If `values` does not hold exactly `m + n - 1` entries.
pub fn hankel<T: Element>(a: &mut DistMatrix<T>, m: usize, n: usize, values: &[T]) {
    let expected = (m + n).saturating_sub(1);
    assert_eq!(
        values.len(),
        expected,
        "a {m}x{n} Hankel matrix needs {expected} values"
    );
    a.resize(m, n);
    a.fill_with(|i, j| values[i + j]);
}

/// The `n × n` Hanowa matrix `[[μI, -D], [D, μI]]` with
/// `D = diag(1, 2, ..., n/2)`
///
/// Its eigenvalues are `μ ± k i` for `k = 1..=n/2`.
///
/// # Panics
/// If `n` is odd.
pub fn hanowa<T: Field>(a: &mut DistMatrix<T>, n: usize, mu: T) {
    assert!(n % 2 == 0, "the Hanowa matrix needs an even size, got {n}");
    let half = n / 2;
    a.resize(n, n);
    a.fill_with(|i, j| {
        if i == j {
            mu
        } else if i < half && j == i + half {
            -T::from_f64((i + 1) as f64)
        } else if i >= half && j + half == i {
            T::from_f64((j + 1) as f64)
        } else {
            T::zero()
        }
    });
}

/// The `n × n` Grcar matrix with `k` superdiagonals of ones
///
/// Minus ones on the subdiagonal, ones on the diagonal and the first `k`
/// superdiagonals. Highly non-normal, which makes it a classic
/// pseudospectrum example.
pub fn grcar<T: Field>(a: &mut DistMatrix<T>, n: usize, k: usize) {
    a.resize(n, n);
    a.fill_with(|i, j| {
        if i == j + 1 {
            -T::one()
        } else if j >= i && j - i <= k {
            T::one()
        } else {
            T::zero()
        }
    });
}

/// The `n × n` Lotkin matrix: the Hilbert matrix with its first row set to
/// ones
pub fn lotkin<T: Field>(a: &mut DistMatrix<T>, n: usize) {
    a.resize(n, n);
    a.fill_with(|i, j| {
        if i == 0 {
            T::one()
        } else {
            T::one() / T::from_f64((i + j + 1) as f64)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalTransport;
    use crate::dist::Dist;
    use crate::dist_matrix::DistRead;
    use crate::grid::Grid;

    fn single() -> std::sync::Arc<Grid> {
        Grid::new(&LocalTransport::universe(1).remove(0)).unwrap()
    }

    #[test]
    fn test_grcar_bands() {
        let grid = single();
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Mc, Dist::Mr);
        grcar(&mut a, 5, 2);
        let m = a.to_matrix().unwrap();
        assert_eq!(m.get(1, 0), -1.0);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 2), 1.0);
        assert_eq!(m.get(0, 3), 0.0);
        assert_eq!(m.get(2, 0), 0.0);
    }

    #[test]
    fn test_hanowa_blocks() {
        let grid = single();
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Mc, Dist::Mr);
        hanowa(&mut a, 4, -1.0);
        let m = a.to_matrix().unwrap();
        assert_eq!(m.get(0, 0), -1.0);
        assert_eq!(m.get(0, 2), -1.0);
        assert_eq!(m.get(1, 3), -2.0);
        assert_eq!(m.get(3, 1), 2.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    #[should_panic(expected = "even size")]
    fn test_hanowa_odd_panics() {
        let grid = single();
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Mc, Dist::Mr);
        hanowa(&mut a, 3, 0.0);
    }

    #[test]
    fn test_lotkin_and_hankel() {
        let grid = single();
        let mut a = DistMatrix::<f64>::new(&grid, Dist::Star, Dist::Star);
        lotkin(&mut a, 3);
        let m = a.to_matrix().unwrap();
        assert_eq!(m.get(0, 2), 1.0);
        assert!((m.get(2, 1) - 0.25).abs() < 1e-15);

        hankel(&mut a, 2, 3, &[1.0, 2.0, 3.0, 4.0]);
        let m = a.to_matrix().unwrap();
        assert_eq!(m.get(1, 2), 4.0);
        assert_eq!(m.get(1, 0), 2.0);
    }
}
