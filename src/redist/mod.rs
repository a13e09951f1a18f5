//! Redistribution between distribution pairs
//!
//! [`redistribute`] plans a chain of hops with [`router::plan`], runs each
//! hop with natural alignments (whatever alignment makes the hop cheapest),
//! and finishes with a root move and a realignment when the destination
//! insists on a particular root or alignment.

mod hops;
pub mod router;

use crate::dist::{Dist, DistMeta};
use crate::dist_matrix::{DistMatrix, DistRead};
use crate::dtype::{Element, Field};
use crate::error::Result;
use crate::grid::{CommKind, Grid};
use crate::matrix::{Matrix, MatrixRef};
use router::{Hop, HopKind};

/// Alignment a dimension arrives with when it moves from `from` to `to`
///
/// `hint` is the destination's alignment when the destination uses `to` in
/// this dimension; it is honoured whenever it costs nothing.
pub fn next_align(grid: &Grid, from: Dist, align: usize, to: Dist, hint: Option<usize>) -> usize {
    let (r, c) = (grid.height(), grid.width());
    match (from, to) {
        (_, Dist::Star | Dist::Circ) => 0,
        (a, b) if a == b => align,
        (Dist::Star | Dist::Circ, _) => hint.unwrap_or(0),
        (Dist::Vc, Dist::Mc) => align % r,
        (Dist::Vr, Dist::Mr) => align % c,
        (Dist::Mc, Dist::Vc) => hint.filter(|h| h % r == align).unwrap_or(align),
        (Dist::Mr, Dist::Vr) => hint.filter(|h| h % c == align).unwrap_or(align),
        _ => hint.unwrap_or(align % to.stride(grid)),
    }
}

fn natural_meta(prev: &DistMeta, to: (Dist, Dist), target: &DistMeta) -> DistMeta {
    let grid = prev.grid();
    let mut meta = prev.with_pair(to.0, to.1);
    let col_hint = (target.col_dist() == to.0).then_some(target.col_align());
    let row_hint = (target.row_dist() == to.1).then_some(target.row_align());
    meta.col_align = next_align(grid, prev.col_dist(), prev.col_align(), to.0, col_hint);
    meta.row_align = next_align(grid, prev.row_dist(), prev.row_align(), to.1, row_hint);
    if meta.cross_kind() != CommKind::Own {
        meta.root = if prev.cross_kind() == meta.cross_kind() {
            prev.root()
        } else if target.cross_kind() == meta.cross_kind() {
            target.root()
        } else {
            0
        };
    }
    meta
}

/// Communicator a same-pair realignment runs over
fn realign_kind(col: Dist, row: Dist) -> CommKind {
    match (col, row) {
        (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc) => CommKind::Vc,
        (d, Dist::Star) | (Dist::Star, d) => d.comm_kind(),
        _ => CommKind::Own,
    }
}

fn describe(route: &[Hop]) -> String {
    route.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ")
}

/// Redistribute the matrix `(src, local)` into the layout of `target`
///
/// The result has `target`'s pair and root. Its alignment equals
/// `target`'s in every constrained dimension and is natural elsewhere.
/// Collective over the owning processes; processes outside the grid get an
/// empty block without communicating.
pub fn redistribute<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, target: &DistMeta) -> Result<DistMatrix<T>> {
    assert!(
        **src.grid() == **target.grid(),
        "redistribution between matrices on different grids"
    );
    assert_eq!(
        (src.height(), src.width()),
        (target.height(), target.width()),
        "redistribution target has the wrong shape"
    );
    let grid = src.grid();
    if !grid.in_grid() {
        return Ok(DistMatrix::from_meta(target.clone()));
    }

    let route = router::plan(src.pair(), target.pair())?;
    if !route.is_empty() {
        tracing::debug!(
            from = ?src,
            to = ?target,
            cost = router::route_cost(&route),
            route = %describe(&route),
            "redistributing"
        );
    }

    let mut current: Option<(DistMeta, Matrix<T>)> = None;
    for hop in &route {
        let (meta, block) = match &current {
            Some((m, b)) => (m, b.as_ref()),
            None => (src, local),
        };
        let next = natural_meta(meta, hop.to, target);
        let moved = hops::execute(hop, meta, block, &next)?;
        current = Some((next, moved));
    }

    let (mut meta, mut block) = match current {
        Some(found) => found,
        None => (src.clone(), local.to_owned()),
    };

    if meta.cross_kind() != CommKind::Own && meta.root() != target.root() {
        let mut moved = meta.clone();
        moved.root = target.root();
        let hop = Hop {
            from: meta.pair(),
            to: meta.pair(),
            kind: HopKind::RootMove,
            comm: meta.cross_kind(),
        };
        block = hops::execute(&hop, &meta, block.as_ref(), &moved)?;
        meta = moved;
    }

    let col_align = if target.col_constrained() {
        target.col_align()
    } else {
        meta.col_align()
    };
    let row_align = if target.row_constrained() {
        target.row_align()
    } else {
        meta.row_align()
    };
    if col_align != meta.col_align() || row_align != meta.row_align() {
        let mut realigned = meta.clone();
        realigned.col_align = col_align;
        realigned.row_align = row_align;
        let hop = Hop {
            from: meta.pair(),
            to: meta.pair(),
            kind: HopKind::Permute,
            comm: realign_kind(meta.col_dist(), meta.row_dist()),
        };
        tracing::trace!(from = ?meta, to = ?realigned, "realigning");
        block = hops::execute(&hop, &meta, block.as_ref(), &realigned)?;
        meta = realigned;
    }

    Ok(DistMatrix::from_meta_and_local(meta, block))
}

fn flip<T: Field>(local: MatrixRef<'_, T>, conjugate: bool) -> Matrix<T> {
    Matrix::from_fn(local.width(), local.height(), |i, j| {
        let v = local.get(j, i);
        if conjugate { v.conj() } else { v }
    })
}

fn transposed<T: Field, S: DistRead<T> + ?Sized>(src: &S, col: Dist, row: Dist, conjugate: bool) -> Result<DistMatrix<T>> {
    let meta = src.meta().transposed();
    let flipped = flip(src.local(), conjugate);
    let target = meta.with_pair(col, row);
    redistribute(&meta, flipped.as_ref(), &target)
}

/// `srcᵀ` laid out as `[col,row]`
///
/// The local blocks are transposed in place of the matrix, which swaps the
/// pair (for example `[MC,MR]` becomes `[MR,MC]`), and the result is then
/// redistributed. Collective over the owning processes.
pub fn transpose<T: Field, S: DistRead<T> + ?Sized>(src: &S, col: Dist, row: Dist) -> Result<DistMatrix<T>> {
    transposed(src, col, row, false)
}

/// `srcᴴ` laid out as `[col,row]`; see [`transpose`]
pub fn adjoint<T: Field, S: DistRead<T> + ?Sized>(src: &S, col: Dist, row: Dist) -> Result<DistMatrix<T>> {
    transposed(src, col, row, true)
}

/// Transpose (optionally conjugated) into an existing matrix, honouring its
/// alignment constraints
pub fn transpose_into<T: Field, S: DistRead<T> + ?Sized>(src: &S, dst: &mut DistMatrix<T>, conjugate: bool) -> Result<()> {
    let meta = src.meta().transposed();
    let flipped = flip(src.local(), conjugate);
    dst.assign_parts(&meta, flipped.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realign_kind() {
        assert_eq!(realign_kind(Dist::Mc, Dist::Mr), CommKind::Vc);
        assert_eq!(realign_kind(Dist::Star, Dist::Vr), CommKind::Vr);
        assert_eq!(realign_kind(Dist::Md, Dist::Star), CommKind::Md);
        assert_eq!(realign_kind(Dist::Star, Dist::Star), CommKind::Own);
    }
}
