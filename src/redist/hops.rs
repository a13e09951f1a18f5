//! Hop primitives: pack, communicate, unpack
//!
//! Every primitive works from index sets alone. For any member of the
//! communicator involved, the rows and columns it holds before and after the
//! hop follow from [`Grid::coords_of`](crate::grid::Grid::coords_of) and the
//! two metadata, so buffer layouts are agreed on without negotiation.
//! Collective buffers are padded to the largest contribution; processes with
//! nothing to say send zeros.

use super::router::{Hop, HopKind};
use crate::dist::DistMeta;
use crate::dist::index::Span;
use crate::dtype::Element;
use crate::error::Result;
use crate::grid::{CommKind, Coords, Grid};
use crate::matrix::{Matrix, MatrixRef};

/// Run one hop, returning the caller's local block under `dst`
pub(crate) fn execute<T: Element>(hop: &Hop, src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Result<Matrix<T>> {
    match hop.kind {
        HopKind::Copy => Ok(local.to_owned()),
        HopKind::Filter => Ok(filter(src, local, dst)),
        HopKind::Permute => permute(src, local, dst, hop.comm),
        HopKind::RootMove => root_move(src, local, dst),
        HopKind::Gather => gather(src, local, dst, hop.comm),
        HopKind::Exchange => exchange(src, local, dst, hop.comm),
        HopKind::ToRoot => gather_to_root(src, local, dst),
        HopKind::FromRoot => scatter_from_root(src, local, dst),
        HopKind::Broadcast => broadcast_from_root(src, local, dst),
    }
}

fn members(grid: &Grid, kind: CommKind) -> Vec<Coords> {
    let size = grid.comm(kind).size();
    (0..size).map(|k| grid.coords_of(grid.member_vc(kind, k))).collect()
}

fn block_len((rows, cols): (Span, Span)) -> usize {
    rows.len * cols.len
}

fn count_shared(a: &Span, b: &Span) -> usize {
    (0..a.len).filter(|&k| b.holds(a.global(k))).count()
}

fn empty_block<T: Element>(dst: &DistMeta) -> Matrix<T> {
    let (rows, cols) = dst.my_spans();
    Matrix::zeros(rows.len, cols.len)
}

/// Pack the entries of `local` (laid out as `from`) that `to` also holds
fn pack_shared<T: Element>(local: MatrixRef<'_, T>, from: (Span, Span), to: (Span, Span), out: &mut Vec<T>) {
    let rows = from.0.shared_with(&to.0);
    for j in from.1.shared_with(&to.1) {
        let jl = from.1.local(j);
        for &i in &rows {
            out.push(local.get(from.0.local(i), jl));
        }
    }
}

/// Inverse of [`pack_shared`] on the receiving side; returns entries used
fn unpack_shared<T: Element>(out: &mut Matrix<T>, from: (Span, Span), to: (Span, Span), data: &[T]) -> usize {
    let rows = from.0.shared_with(&to.0);
    let mut next = 0;
    for j in from.1.shared_with(&to.1) {
        let jl = to.1.local(j);
        for &i in &rows {
            out.set(to.0.local(i), jl, data[next]);
            next += 1;
        }
    }
    next
}

/// Unpack a full local block of a contributor laid out as `from`
fn unpack_block<T: Element>(out: &mut Matrix<T>, from: (Span, Span), to: (Span, Span), data: &[T]) {
    for jl in 0..from.1.len {
        let j = from.1.global(jl);
        if !to.1.holds(j) {
            continue;
        }
        let jd = to.1.local(j);
        for il in 0..from.0.len {
            let i = from.0.global(il);
            if to.0.holds(i) {
                out.set(to.0.local(i), jd, data[il + jl * from.0.len]);
            }
        }
    }
}

fn padded_pack<T: Element>(local: MatrixRef<'_, T>, pad: usize) -> Vec<T> {
    let mut buf = Vec::with_capacity(pad);
    local.pack_into(&mut buf);
    buf.resize(pad, T::zero());
    buf
}

/// Keep the part of the local block the destination still needs
pub(crate) fn filter<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Matrix<T> {
    let (sr, sc) = src.my_spans();
    let (dr, dc) = dst.my_spans();
    let mut out = Matrix::zeros(dr.len, dc.len);
    for jl in 0..dc.len {
        let js = sc.local(dc.global(jl));
        for il in 0..dr.len {
            out.set(il, jl, local.get(sr.local(dr.global(il)), js));
        }
    }
    out
}

/// All-gather over `kind`, then broadcast over the source's cross
/// communicator if the destination has none
pub(crate) fn gather<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta, kind: CommKind) -> Result<Matrix<T>> {
    let grid = src.grid();
    let comm = grid.comm(kind);
    let contributors = members(grid, kind);
    let spans: Vec<(Span, Span)> = contributors.iter().map(|c| src.spans_of(c)).collect();
    let pad = spans.iter().map(|&s| block_len(s)).max().unwrap_or(0);

    let send = padded_pack(local, pad);
    let mut recv = vec![T::zero(); pad * comm.size()];
    comm.all_gather(&send, &mut recv)?;

    let mine = dst.my_spans();
    let mut out = Matrix::zeros(mine.0.len, mine.1.len);
    for (k, &from) in spans.iter().enumerate() {
        unpack_block(&mut out, from, mine, &recv[k * pad..(k + 1) * pad]);
    }

    if src.cross_kind() != CommKind::Own && dst.cross_kind() == CommKind::Own {
        let mut packed = Vec::with_capacity(mine.0.len * mine.1.len);
        out.as_ref().pack_into(&mut packed);
        src.cross_comm().broadcast(&mut packed, src.root())?;
        out.as_mut().unpack_from(&packed);
    }
    Ok(out)
}

/// Personalized all-to-all within `kind`
pub(crate) fn exchange<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta, kind: CommKind) -> Result<Matrix<T>> {
    let grid = src.grid();
    let comm = grid.comm(kind);
    let peers = members(grid, kind);
    let src_spans: Vec<(Span, Span)> = peers.iter().map(|c| src.spans_of(c)).collect();
    let dst_spans: Vec<(Span, Span)> = peers.iter().map(|c| dst.spans_of(c)).collect();

    let mut pad = 0;
    for from in &src_spans {
        for to in &dst_spans {
            pad = pad.max(count_shared(&from.0, &to.0) * count_shared(&from.1, &to.1));
        }
    }

    let me = comm.rank();
    let mut send = Vec::with_capacity(pad * peers.len());
    for &to in &dst_spans {
        let start = send.len();
        pack_shared(local, src_spans[me], to, &mut send);
        send.resize(start + pad, T::zero());
    }
    let mut recv = vec![T::zero(); send.len()];
    comm.all_to_all(&send, &mut recv)?;

    let mine = dst_spans[me];
    let mut out = Matrix::zeros(mine.0.len, mine.1.len);
    for (k, &from) in src_spans.iter().enumerate() {
        unpack_shared(&mut out, from, mine, &recv[k * pad..(k + 1) * pad]);
    }
    Ok(out)
}

/// Swap whole local blocks with the unique partner whose destination
/// index set equals this process's source index set
pub(crate) fn permute<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta, kind: CommKind) -> Result<Matrix<T>> {
    if !src.participating() && !dst.participating() {
        return Ok(empty_block(dst));
    }
    let grid = src.grid();
    let comm = grid.comm(kind);
    let peers = members(grid, kind);
    let me = grid.my_coords();
    let (my_src, my_dst) = (src.spans_of(&me), dst.spans_of(&me));

    let to = peers
        .iter()
        .position(|c| dst.spans_of(c) == my_src)
        .unwrap_or_else(|| panic!("no permutation partner receives {my_src:?}"));
    let from = peers
        .iter()
        .position(|c| src.spans_of(c) == my_dst)
        .unwrap_or_else(|| panic!("no permutation partner sends {my_dst:?}"));

    let mut send = Vec::with_capacity(block_len(my_src));
    local.pack_into(&mut send);
    let mut recv = vec![T::zero(); block_len(my_dst)];
    comm.send_recv(&send, to, &mut recv, from)?;

    let mut out = Matrix::zeros(my_dst.0.len, my_dst.1.len);
    out.as_mut().unpack_from(&recv);
    Ok(out)
}

/// Hand the data from the source root to the destination root
pub(crate) fn root_move<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Result<Matrix<T>> {
    let mut out = empty_block(dst);
    let (old, new) = (src.root(), dst.root());
    if old == new {
        return Ok(local.to_owned());
    }
    let comm = src.cross_comm();
    if comm.rank() == old {
        let mut send = Vec::with_capacity(local.height() * local.width());
        local.pack_into(&mut send);
        comm.send(&send, new)?;
    }
    if comm.rank() == new {
        let mut recv = vec![T::zero(); out.height() * out.width()];
        comm.recv(&mut recv, old)?;
        out.as_mut().unpack_from(&recv);
    }
    Ok(out)
}

/// Gather every local block onto the `CIRC` root
pub(crate) fn gather_to_root<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Result<Matrix<T>> {
    let grid = src.grid();
    let comm = grid.comm(CommKind::Vc);
    let spans: Vec<(Span, Span)> = members(grid, CommKind::Vc).iter().map(|c| src.spans_of(c)).collect();
    let pad = spans.iter().map(|&s| block_len(s)).max().unwrap_or(0);
    let root = dst.root();

    let send = padded_pack(local, pad);
    let mine = dst.my_spans();
    let mut out = Matrix::zeros(mine.0.len, mine.1.len);
    if comm.rank() == root {
        let mut recv = vec![T::zero(); pad * comm.size()];
        comm.gather(&send, &mut recv, root)?;
        for (k, &from) in spans.iter().enumerate() {
            unpack_block(&mut out, from, mine, &recv[k * pad..(k + 1) * pad]);
        }
    } else {
        comm.gather(&send, &mut [], root)?;
    }
    Ok(out)
}

/// Scatter from the `CIRC` root to a distributed layout
pub(crate) fn scatter_from_root<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Result<Matrix<T>> {
    let grid = src.grid();
    let comm = grid.comm(CommKind::Vc);
    let spans: Vec<(Span, Span)> = members(grid, CommKind::Vc).iter().map(|c| dst.spans_of(c)).collect();
    let pad = spans.iter().map(|&s| block_len(s)).max().unwrap_or(0);
    let root = src.root();

    let mut send = Vec::new();
    if comm.rank() == root {
        let held = src.my_spans();
        send.reserve(pad * comm.size());
        for &to in &spans {
            let start = send.len();
            pack_shared(local, held, to, &mut send);
            send.resize(start + pad, T::zero());
        }
    }
    let mut recv = vec![T::zero(); pad];
    comm.scatter(&send, &mut recv, root)?;

    let mine = dst.my_spans();
    let mut out = Matrix::zeros(mine.0.len, mine.1.len);
    let root_spans = src.spans_of(&grid.coords_of(root));
    unpack_shared(&mut out, root_spans, mine, &recv);
    Ok(out)
}

/// Replicate the `CIRC` root's data everywhere
pub(crate) fn broadcast_from_root<T: Element>(src: &DistMeta, local: MatrixRef<'_, T>, dst: &DistMeta) -> Result<Matrix<T>> {
    let comm = src.grid().comm(CommKind::Vc);
    let mut out = empty_block(dst);
    let mut buf = Vec::with_capacity(out.height() * out.width());
    if comm.rank() == src.root() {
        local.pack_into(&mut buf);
    } else {
        buf.resize(out.height() * out.width(), T::zero());
    }
    comm.broadcast(&mut buf, src.root())?;
    out.as_mut().unpack_from(&buf);
    Ok(out)
}
