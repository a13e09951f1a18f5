//! Cyclic index arithmetic
//!
//! A dimension of length `n` dealt round-robin over `stride` owners starting
//! at owner `align` gives owner `q` the indices `i` with
//! `(i + align) mod stride == q`, i.e. `shift(q), shift(q) + stride, ...`.

/// Number of indices in `[0, n)` congruent to `shift` modulo `stride`
#[inline]
pub fn length(n: usize, shift: usize, stride: usize) -> usize {
    debug_assert!(stride > 0);
    if n > shift {
        (n - shift).div_ceil(stride)
    } else {
        0
    }
}

/// Largest [`length`] over all shifts
#[inline]
pub fn max_length(n: usize, stride: usize) -> usize {
    n.div_ceil(stride)
}

/// First global index owned by `rank` when the distribution starts at `align`
#[inline]
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    debug_assert!(rank < stride && align < stride);
    (rank + stride - align) % stride
}

/// Global index of local index `local` for an owner with the given shift
#[inline]
pub fn global_index(local: usize, shift: usize, stride: usize) -> usize {
    shift + local * stride
}

/// Owner of global index `i`
#[inline]
pub fn owner(i: usize, align: usize, stride: usize) -> usize {
    (i + align) % stride
}

/// The index set one process holds in one dimension
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Span {
    /// First global index
    pub shift: usize,
    /// Distance between consecutive global indices
    pub stride: usize,
    /// Number of indices held
    pub len: usize,
}

impl Span {
    /// Nothing held
    pub const EMPTY: Span = Span {
        shift: 0,
        stride: 1,
        len: 0,
    };

    /// Span of an owner with `shift` over a dimension of length `n`
    #[inline]
    pub fn new(n: usize, shift: usize, stride: usize) -> Self {
        Self {
            shift,
            stride,
            len: length(n, shift, stride),
        }
    }

    /// Global index of local index `k`
    #[inline]
    pub fn global(&self, k: usize) -> usize {
        global_index(k, self.shift, self.stride)
    }

    /// Whether global index `i` is held
    #[inline]
    pub fn holds(&self, i: usize) -> bool {
        i >= self.shift && (i - self.shift) % self.stride == 0 && (i - self.shift) / self.stride < self.len
    }

    /// Local index of a held global index
    #[inline]
    pub fn local(&self, i: usize) -> usize {
        debug_assert!(self.holds(i), "global index {i} not held by {self:?}");
        (i - self.shift) / self.stride
    }

    /// Global indices held here that `other` also holds, ascending
    pub fn shared_with(&self, other: &Span) -> Vec<usize> {
        (0..self.len).map(|k| self.global(k)).filter(|&i| other.holds(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        assert_eq!(length(10, 0, 3), 4);
        assert_eq!(length(10, 1, 3), 3);
        assert_eq!(length(10, 2, 3), 3);
        assert_eq!(length(2, 3, 4), 0);
        assert_eq!(length(0, 0, 1), 0);
        let total: usize = (0..4).map(|s| length(13, s, 4)).sum();
        assert_eq!(total, 13);
    }

    #[test]
    fn test_max_length() {
        assert_eq!(max_length(10, 3), 4);
        assert_eq!(max_length(9, 3), 3);
        assert_eq!(max_length(0, 3), 0);
    }

    #[test]
    fn test_shift_and_owner_agree() {
        for stride in 1..5 {
            for align in 0..stride {
                for rank in 0..stride {
                    let s = shift(rank, align, stride);
                    assert_eq!(owner(s, align, stride), rank);
                }
            }
        }
    }

    #[test]
    fn test_span_membership() {
        let span = Span::new(10, 1, 3);
        assert_eq!(span.len, 3);
        assert!(span.holds(4));
        assert!(!span.holds(5));
        assert!(!span.holds(10));
        assert_eq!(span.local(7), 2);
        assert_eq!(span.shared_with(&Span::new(10, 1, 6)), vec![1, 7]);
    }
}
