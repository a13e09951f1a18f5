//! Distributed BLAS-like kernels
//!
//! The routines here take any [`DistRead`](crate::dist_matrix::DistRead) /
//! [`DistWrite`](crate::dist_matrix::DistWrite) operand, so owners and views
//! are interchangeable. Level-3 routines are blocked by the grid's block
//! size and move panels into the layouts that make the local update a
//! plain [`local`] kernel call.
//!
//! Unless stated otherwise every routine is collective over the owning
//! processes of the grid its operands live on.

mod gemm;
mod level1;
pub mod local;
mod multi_shift;
mod trmm;
mod trsm;

pub use gemm::gemm;
pub use level1::{
    Location, axpy, column_norms, column_swap, conjugate, diagonal_scale, fill, make_hermitian, make_trapezoidal,
    make_triangular, max_abs_loc, row_swap, scale, set_diagonal, shift_diagonal, zero,
};
pub use multi_shift::multi_shift_trsm;
pub use trmm::trmm;
pub use trsm::trsm;

use crate::dist::Dist;
use crate::dist_matrix::{DistMatrix, DistRead};
use crate::dtype::Field;
use crate::error::Result;
use crate::redist;

/// Which triangle of a matrix is referenced
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpperOrLower {
    /// On and below the diagonal
    Lower,
    /// On and above the diagonal
    Upper,
}

impl UpperOrLower {
    /// The other triangle
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Lower => Self::Upper,
            Self::Upper => Self::Lower,
        }
    }
}

/// How an operand enters a product or solve
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// `A`
    Normal,
    /// `Aᵀ`
    Transpose,
    /// `Aᴴ`
    Adjoint,
}

impl Orientation {
    /// Whether the operand is used transposed (with or without conjugation)
    #[inline]
    pub fn is_transposed(self) -> bool {
        self != Self::Normal
    }
}

/// Which side a triangular or diagonal operand is applied from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// `op(A) B`
    Left,
    /// `B op(A)`
    Right,
}

/// Whether the diagonal of a triangular operand is implicitly one
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitOrNonUnit {
    /// Use the stored diagonal
    NonUnit,
    /// Treat the diagonal as all ones without reading it
    Unit,
}

/// `op(A)` as a fresh `[MC,MR]` matrix
pub(crate) fn to_mc_mr<T: Field, A: DistRead<T> + ?Sized>(a: &A, orient: Orientation) -> Result<DistMatrix<T>> {
    match orient {
        Orientation::Normal => {
            let mut m = DistMatrix::new(a.grid(), Dist::Mc, Dist::Mr);
            m.assign(a)?;
            Ok(m)
        }
        Orientation::Transpose => redist::transpose(a, Dist::Mc, Dist::Mr),
        Orientation::Adjoint => redist::adjoint(a, Dist::Mc, Dist::Mr),
    }
}
