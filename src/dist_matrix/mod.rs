//! Distributed matrices
//!
//! [`DistMatrix`] owns its local block. [`DistView`] and [`DistViewMut`]
//! borrow a rectangle of another distributed matrix without copying. The
//! algorithms are written against the [`DistRead`] and [`DistWrite`] traits
//! so they accept owners and views alike.
//!
//! A locked view cannot be written to:
//!
//! ```compile_fail
//! use distla::prelude::*;
//!
//! fn poke(a: &DistMatrix<f64>) {
//!     let mut v = a.view(0, 0, 1, 1);
//!     v.set(0, 0, 1.0);
//! }
//! ```

mod view;

pub use view::{DistView, DistViewMut};

use crate::dist::index::{self, Span};
use crate::dist::{Dist, DistMeta};
use crate::dtype::{Element, Field};
use crate::error::Result;
use crate::grid::{CommKind, Grid};
use crate::matrix::{Matrix, MatrixMut, MatrixRef};
use crate::redist;
use std::sync::Arc;

/// Length of the `offset` diagonal of an `height × width` matrix
pub fn diagonal_length(height: usize, width: usize, offset: isize) -> usize {
    if offset >= 0 {
        width.saturating_sub(offset as usize).min(height)
    } else {
        height.saturating_sub(offset.unsigned_abs()).min(width)
    }
}

#[inline]
pub(crate) fn diagonal_entry(k: usize, offset: isize) -> (usize, usize) {
    if offset >= 0 {
        (k, k + offset as usize)
    } else {
        (k + offset.unsigned_abs(), k)
    }
}

/// Offset and extent of a sub-range inside a span, in local indices
fn local_range(span: &Span, offset: usize, extent: usize) -> (usize, usize) {
    if span.len == 0 {
        return (0, 0);
    }
    let start = index::length(offset, span.shift, span.stride);
    let end = index::length(offset + extent, span.shift, span.stride);
    (start, end - start)
}

/// Metadata and local block of a `h × w` window at (i, j)
pub(crate) fn window(meta: &DistMeta, i: usize, j: usize, h: usize, w: usize) -> (DistMeta, [usize; 4]) {
    assert!(
        i + h <= meta.height() && j + w <= meta.width(),
        "window [{i}, {}) x [{j}, {}) exceeds a {}x{} matrix",
        i + h,
        j + w,
        meta.height(),
        meta.width()
    );
    let (rows, cols) = meta.my_spans();
    let (il, lh) = local_range(&rows, i, h);
    let (jl, lw) = local_range(&cols, j, w);
    let mut sub = meta.clone();
    sub.height = h;
    sub.width = w;
    sub.col_align = (meta.col_align() + i) % meta.col_stride();
    sub.row_align = (meta.row_align() + j) % meta.row_stride();
    sub.col_constrained = true;
    sub.row_constrained = true;
    (sub, [il, jl, lh, lw])
}

/// Read access to a distributed matrix
pub trait DistRead<T: Element> {
    /// Distribution metadata
    fn meta(&self) -> &DistMeta;

    /// The calling process's local block
    fn local(&self) -> MatrixRef<'_, T>;

    /// Global height
    fn height(&self) -> usize {
        self.meta().height()
    }

    /// Global width
    fn width(&self) -> usize {
        self.meta().width()
    }

    /// The grid the matrix lives on
    fn grid(&self) -> &Arc<Grid> {
        self.meta().grid()
    }

    /// Local height on the calling process
    fn local_height(&self) -> usize {
        self.local().height()
    }

    /// Local width on the calling process
    fn local_width(&self) -> usize {
        self.local().width()
    }

    /// Local entry (il, jl); no communication
    fn get_local(&self, il: usize, jl: usize) -> T {
        self.local().get(il, jl)
    }

    /// Global entry (i, j), returned on every in-grid process
    ///
    /// Collective over the owning processes.
    fn get(&self, i: usize, j: usize) -> Result<T> {
        let meta = self.meta();
        assert!(meta.grid().in_grid(), "get called on a process outside the grid");
        assert!(
            i < meta.height() && j < meta.width(),
            "({i}, {j}) out of bounds for a {}x{} matrix",
            meta.height(),
            meta.width()
        );
        let mut value = [T::zero()];
        if meta.participating() {
            if meta.is_local(i, j) {
                value[0] = self.local().get(meta.local_row(i), meta.local_col(j));
            }
            meta.dist_comm().broadcast(&mut value, meta.dist_rank_of_owner(i, j))?;
        }
        if meta.cross_kind() != CommKind::Own {
            meta.cross_comm().broadcast(&mut value, meta.root())?;
        }
        Ok(value[0])
    }

    /// Real part of [`get`](Self::get)
    fn get_real_part(&self, i: usize, j: usize) -> Result<T::Real>
    where
        T: Field,
    {
        Ok(self.get(i, j)?.real_part())
    }

    /// Imaginary part of [`get`](Self::get)
    fn get_imag_part(&self, i: usize, j: usize) -> Result<T::Real>
    where
        T: Field,
    {
        Ok(self.get(i, j)?.imag_part())
    }

    /// Read-only window of `h × w` entries starting at (i, j)
    fn view(&self, i: usize, j: usize, h: usize, w: usize) -> DistView<'_, T> {
        let (meta, [il, jl, lh, lw]) = window(self.meta(), i, j, h, w);
        DistView::from_parts(meta, self.local().view(il, jl, lh, lw))
    }

    /// Read-only view of the whole matrix
    fn as_view(&self) -> DistView<'_, T> {
        DistView::from_parts(self.meta().clone(), self.local())
    }

    /// Replicated copy of the entries at `rows × cols`
    ///
    /// Collective over the owning processes.
    fn get_submatrix(&self, rows: &[usize], cols: &[usize]) -> Result<DistMatrix<T>> {
        let meta = self.meta();
        let (height, width) = (meta.height(), meta.width());
        if let Some(i) = rows.iter().find(|&&i| i >= height) {
            panic!("row {i} out of bounds for a {height}x{width} matrix");
        }
        if let Some(j) = cols.iter().find(|&&j| j >= width) {
            panic!("column {j} out of bounds for a {height}x{width} matrix");
        }
        let mut out = DistMatrix::<T>::with_shape(meta.grid(), Dist::Star, Dist::Star, rows.len(), cols.len());
        if !meta.grid().in_grid() {
            return Ok(out);
        }
        if meta.participating() {
            let local = self.local();
            let mut buf = out.local_mut();
            for (jj, &j) in cols.iter().enumerate() {
                for (ii, &i) in rows.iter().enumerate() {
                    if meta.is_local(i, j) {
                        buf.set(ii, jj, local.get(meta.local_row(i), meta.local_col(j)));
                    }
                }
            }
            let mut packed = Vec::with_capacity(rows.len() * cols.len());
            buf.rb().pack_into(&mut packed);
            meta.dist_comm().all_reduce_sum(&mut packed)?;
            buf.unpack_from(&packed);
        }
        if meta.cross_kind() != CommKind::Own {
            let mut packed = Vec::with_capacity(rows.len() * cols.len());
            out.local().pack_into(&mut packed);
            meta.cross_comm().broadcast(&mut packed, meta.root())?;
            out.local_mut().unpack_from(&packed);
        }
        Ok(out)
    }

    /// Redistribute to `[STAR,STAR]`
    fn to_star_star(&self) -> Result<DistMatrix<T>> {
        let mut out = DistMatrix::new(self.grid(), Dist::Star, Dist::Star);
        out.assign(self)?;
        Ok(out)
    }

    /// Replicated local copy of the whole matrix
    fn to_matrix(&self) -> Result<Matrix<T>> {
        let ss = self.to_star_star()?;
        Ok(if ss.meta().participating() {
            ss.local().to_owned()
        } else {
            Matrix::zeros(0, 0)
        })
    }

    /// The `offset` diagonal as a column vector
    ///
    /// `[MC,MR]` and `[MR,MC]` matrices yield an `[MD,STAR]` vector aligned
    /// with the diagonal, so no data moves. Other layouts yield
    /// `[STAR,STAR]`.
    fn get_diagonal(&self, offset: isize) -> Result<DistMatrix<T>> {
        let meta = self.meta();
        let len = diagonal_length(meta.height(), meta.width(), offset);
        if matches!(meta.pair(), (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc)) {
            let mut d = DistMatrix::new(meta.grid(), Dist::Md, Dist::Star);
            d.align_with_diagonal(meta, offset);
            d.resize(len, 1);
            let (span, _) = d.meta().my_spans();
            let local = self.local();
            let mut out = d.local_mut();
            for k in 0..span.len {
                let (i, j) = diagonal_entry(span.global(k), offset);
                out.set(k, 0, local.get(meta.local_row(i), meta.local_col(j)));
            }
            drop(out);
            return Ok(d);
        }
        let ss = self.to_star_star()?;
        let mut d = DistMatrix::with_shape(meta.grid(), Dist::Star, Dist::Star, len, 1);
        if ss.meta().participating() {
            for k in 0..len {
                let (i, j) = diagonal_entry(k, offset);
                d.set_local(k, 0, ss.get_local(i, j));
            }
        }
        Ok(d)
    }
}

/// Write access to a distributed matrix
pub trait DistWrite<T: Element>: DistRead<T> {
    /// Mutable local block
    fn local_mut(&mut self) -> MatrixMut<'_, T>;

    /// Overwrite global entry (i, j) on the processes that hold it
    ///
    /// No communication; every process may call it.
    fn set(&mut self, i: usize, j: usize, value: T) {
        let meta = self.meta();
        assert!(
            i < meta.height() && j < meta.width(),
            "({i}, {j}) out of bounds for a {}x{} matrix",
            meta.height(),
            meta.width()
        );
        if meta.is_local(i, j) {
            let (il, jl) = (meta.local_row(i), meta.local_col(j));
            self.local_mut().set(il, jl, value);
        }
    }

    /// Add `value` to global entry (i, j) on the processes that hold it
    fn update(&mut self, i: usize, j: usize, value: T) {
        let meta = self.meta();
        assert!(
            i < meta.height() && j < meta.width(),
            "({i}, {j}) out of bounds for a {}x{} matrix",
            meta.height(),
            meta.width()
        );
        if meta.is_local(i, j) {
            let (il, jl) = (meta.local_row(i), meta.local_col(j));
            self.local_mut().update(il, jl, value);
        }
    }

    /// Overwrite local entry (il, jl)
    fn set_local(&mut self, il: usize, jl: usize, value: T) {
        self.local_mut().set(il, jl, value);
    }

    /// Add to local entry (il, jl)
    fn update_local(&mut self, il: usize, jl: usize, value: T) {
        self.local_mut().update(il, jl, value);
    }

    /// Writable window of `h × w` entries starting at (i, j)
    fn view_mut(&mut self, i: usize, j: usize, h: usize, w: usize) -> DistViewMut<'_, T> {
        let (meta, [il, jl, lh, lw]) = window(self.meta(), i, j, h, w);
        DistViewMut::from_parts(meta, self.local_mut().into_view(il, jl, lh, lw))
    }

    /// Writable view of the whole matrix
    fn as_view_mut(&mut self) -> DistViewMut<'_, T> {
        let meta = self.meta().clone();
        DistViewMut::from_parts(meta, self.local_mut())
    }

    /// Overwrite the `offset` diagonal with the column vector `d`
    ///
    /// Collective over the owning processes.
    fn set_diagonal<S: DistRead<T>>(&mut self, d: &S, offset: isize) -> Result<()> {
        let meta = self.meta().clone();
        let len = diagonal_length(meta.height(), meta.width(), offset);
        assert_eq!((d.height(), d.width()), (len, 1), "diagonal vector has the wrong shape");
        if matches!(meta.pair(), (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc)) {
            let mut aligned = DistMatrix::new(meta.grid(), Dist::Md, Dist::Star);
            aligned.align_with_diagonal(&meta, offset);
            aligned.assign(d)?;
            let (span, _) = aligned.meta().my_spans();
            let mut local = self.local_mut();
            for k in 0..span.len {
                let (i, j) = diagonal_entry(span.global(k), offset);
                local.set(meta.local_row(i), meta.local_col(j), aligned.get_local(k, 0));
            }
            return Ok(());
        }
        let ss = d.to_star_star()?;
        if ss.meta().participating() {
            for k in 0..len {
                let (i, j) = diagonal_entry(k, offset);
                self.set(i, j, ss.get_local(k, 0));
            }
        }
        Ok(())
    }
}

/// A distributed matrix that owns its local block
#[derive(Clone)]
pub struct DistMatrix<T> {
    meta: DistMeta,
    local: Matrix<T>,
}

impl<T: Element> DistMatrix<T> {
    /// Empty `[col,row]` matrix on `grid` with no alignment constraints
    pub fn new(grid: &Arc<Grid>, col_dist: Dist, row_dist: Dist) -> Self {
        Self {
            meta: DistMeta::new(grid, col_dist, row_dist),
            local: Matrix::zeros(0, 0),
        }
    }

    /// Zero-filled `height × width` matrix
    pub fn with_shape(grid: &Arc<Grid>, col_dist: Dist, row_dist: Dist, height: usize, width: usize) -> Self {
        let mut m = Self::new(grid, col_dist, row_dist);
        m.resize(height, width);
        m
    }

    /// Matrix whose entry (i, j) is `f(i, j)`; no communication
    pub fn from_fn(
        grid: &Arc<Grid>,
        col_dist: Dist,
        row_dist: Dist,
        height: usize,
        width: usize,
        f: impl Fn(usize, usize) -> T,
    ) -> Self {
        let mut m = Self::with_shape(grid, col_dist, row_dist, height, width);
        m.fill_with(f);
        m
    }

    /// Empty matrix pinned to `meta`'s pair, alignments and root
    ///
    /// Assigning into it lands every entry exactly where `meta` would hold
    /// it, which is what elementwise combinations of two matrices need.
    pub fn aligned_like(meta: &DistMeta) -> Self {
        let mut pinned = meta.clone();
        pinned.height = 0;
        pinned.width = 0;
        pinned.col_constrained = true;
        pinned.row_constrained = true;
        Self::from_meta(pinned)
    }

    /// Zeroed matrix laid out as `meta`
    pub(crate) fn from_meta(meta: DistMeta) -> Self {
        let mut m = Self {
            meta,
            local: Matrix::zeros(0, 0),
        };
        m.reallocate();
        m
    }

    pub(crate) fn from_meta_and_local(meta: DistMeta, local: Matrix<T>) -> Self {
        debug_assert_eq!((local.height(), local.width()), (meta.local_height(), meta.local_width()));
        Self { meta, local }
    }

    pub(crate) fn into_parts(self) -> (DistMeta, Matrix<T>) {
        (self.meta, self.local)
    }

    /// Overwrite every local entry with `f(i, j)` of its global index
    pub fn fill_with(&mut self, f: impl Fn(usize, usize) -> T) {
        let (rows, cols) = self.meta.my_spans();
        for jl in 0..cols.len {
            for il in 0..rows.len {
                self.local.set(il, jl, f(rows.global(il), cols.global(jl)));
            }
        }
    }

    fn reallocate(&mut self) {
        let (rows, cols) = self.meta.my_spans();
        self.local = Matrix::zeros(rows.len, cols.len);
    }

    /// The owned local block
    pub fn local_matrix(&self) -> &Matrix<T> {
        &self.local
    }

    /// Set the global shape, keeping the alignments
    pub fn resize(&mut self, height: usize, width: usize) {
        self.meta.height = height;
        self.meta.width = width;
        let (rows, cols) = self.meta.my_spans();
        self.local.resize(rows.len, cols.len);
    }

    /// Drop all entries and alignment constraints
    pub fn empty(&mut self) {
        self.meta.height = 0;
        self.meta.width = 0;
        self.meta.col_constrained = false;
        self.meta.row_constrained = false;
        self.local = Matrix::zeros(0, 0);
    }

    fn empty_data(&mut self) {
        self.meta.height = 0;
        self.meta.width = 0;
        self.local = Matrix::zeros(0, 0);
    }

    /// Fix both alignments; the matrix is emptied if they change
    pub fn align(&mut self, col_align: usize, row_align: usize) {
        self.align_cols(col_align);
        self.align_rows(row_align);
    }

    /// Fix the column alignment; the matrix is emptied if it changes
    pub fn align_cols(&mut self, col_align: usize) {
        let stride = self.meta.col_stride();
        assert!(col_align < stride, "column alignment {col_align} exceeds stride {stride}");
        if self.meta.col_align != col_align {
            self.empty_data();
            self.meta.col_align = col_align;
        }
        self.meta.col_constrained = true;
    }

    /// Fix the row alignment; the matrix is emptied if it changes
    pub fn align_rows(&mut self, row_align: usize) {
        let stride = self.meta.row_stride();
        assert!(row_align < stride, "row alignment {row_align} exceeds stride {stride}");
        if self.meta.row_align != row_align {
            self.empty_data();
            self.meta.row_align = row_align;
        }
        self.meta.row_constrained = true;
    }

    /// Adopt alignments of `other` for unconstrained dimensions whose
    /// distributions match or refine each other
    ///
    /// The root of `other` is adopted only when neither dimension is
    /// constrained.
    pub fn align_with(&mut self, other: &DistMeta) {
        assert!(**self.meta.grid() == **other.grid(), "cannot align with a matrix on another grid");
        let grid = Arc::clone(self.meta.grid());
        if !self.meta.col_constrained {
            let found = compatible_align(&grid, self.meta.col_dist(), other.col_dist(), other.col_align())
                .or_else(|| compatible_align(&grid, self.meta.col_dist(), other.row_dist(), other.row_align()));
            if let Some(align) = found {
                self.align_cols(align);
            }
        }
        if !self.meta.row_constrained {
            let found = compatible_align(&grid, self.meta.row_dist(), other.row_dist(), other.row_align())
                .or_else(|| compatible_align(&grid, self.meta.row_dist(), other.col_dist(), other.col_align()));
            if let Some(align) = found {
                self.align_rows(align);
            }
        }
        // A pinned layout keeps its root along with its alignments
        let pinned = self.meta.col_constrained || self.meta.row_constrained;
        if !pinned && self.meta.cross_kind() == other.cross_kind() && self.meta.root != other.root() {
            self.set_root(other.root());
        }
    }

    /// Align an `[MD,STAR]` or `[STAR,MD]` vector with the `offset` diagonal
    /// of an `[MC,MR]` or `[MR,MC]` matrix
    pub fn align_with_diagonal(&mut self, other: &DistMeta, offset: isize) {
        let root = other.diagonal_root(offset);
        let align = other.diagonal_align(offset);
        self.set_root(root);
        match self.meta.pair() {
            (Dist::Md, Dist::Star) => self.align(align, 0),
            (Dist::Star, Dist::Md) => self.align(0, align),
            pair => panic!("[{},{}] cannot align with a diagonal", pair.0, pair.1),
        }
    }

    /// Set alignments (where unconstrained, or always with `force`) and
    /// resize
    pub fn align_and_resize(&mut self, col_align: usize, row_align: usize, height: usize, width: usize, force: bool) {
        if force || !self.meta.col_constrained {
            assert!(col_align < self.meta.col_stride(), "column alignment out of range");
            self.meta.col_align = col_align;
        }
        if force || !self.meta.row_constrained {
            assert!(row_align < self.meta.row_stride(), "row alignment out of range");
            self.meta.row_align = row_align;
        }
        self.local = Matrix::zeros(0, 0);
        self.resize(height, width);
    }

    /// Clear both alignment constraints
    pub fn free_alignments(&mut self) {
        self.meta.col_constrained = false;
        self.meta.row_constrained = false;
    }

    /// Move to another grid; alignments reset and the matrix is emptied
    pub fn set_grid(&mut self, grid: &Arc<Grid>) {
        self.meta.set_grid(grid);
        self.meta.col_align = 0;
        self.meta.row_align = 0;
        self.meta.root = 0;
        self.empty();
    }

    /// Choose the root (diagonal path for `MD`, vc rank for `CIRC`)
    ///
    /// The matrix is emptied if the root changes.
    pub fn set_root(&mut self, root: usize) {
        let grid = Arc::clone(self.meta.grid());
        let limit = match self.meta.cross_kind() {
            CommKind::MdPerp => grid.gcd(),
            CommKind::Vc => grid.size(),
            _ => 1,
        };
        assert!(root < limit, "root {root} out of range for {:?}", self.meta);
        if self.meta.root != root {
            self.empty_data();
            self.meta.root = root;
        }
    }

    /// Redistribute `src` into this matrix's layout
    ///
    /// Unconstrained dimensions take whatever alignment the redistribution
    /// arrives with; constrained ones end up exactly where they were.
    /// Collective over the owning processes.
    pub fn assign<S: DistRead<T> + ?Sized>(&mut self, src: &S) -> Result<()> {
        self.assign_parts(src.meta(), src.local())
    }

    pub(crate) fn assign_parts(&mut self, src: &DistMeta, src_local: MatrixRef<'_, T>) -> Result<()> {
        let mut target = self.meta.clone();
        target.height = src.height();
        target.width = src.width();
        let (mut meta, local) = redist::redistribute(src, src_local, &target)?.into_parts();
        meta.col_constrained = self.meta.col_constrained;
        meta.row_constrained = self.meta.row_constrained;
        self.meta = meta;
        self.local = local;
        Ok(())
    }

    /// Make every viewing process agree with vc rank 0's metadata
    ///
    /// Collective over the viewing communicator, so processes outside the
    /// grid may (and must) call it too.
    pub fn make_consistent(&mut self) -> Result<()> {
        let grid = Arc::clone(self.meta.grid());
        let mut message = [
            self.meta.col_constrained as u64,
            self.meta.row_constrained as u64,
            self.meta.col_align as u64,
            self.meta.row_align as u64,
            self.meta.root as u64,
            self.meta.height as u64,
            self.meta.width as u64,
        ];
        grid.viewing_comm().broadcast(&mut message, grid.vc_to_viewing(0))?;
        let [col_constrained, row_constrained, col_align, row_align, root, height, width] = message;
        let changed = self.meta.col_align != col_align as usize
            || self.meta.row_align != row_align as usize
            || self.meta.root != root as usize;
        self.meta.col_constrained = col_constrained != 0;
        self.meta.row_constrained = row_constrained != 0;
        self.meta.col_align = col_align as usize;
        self.meta.row_align = row_align as usize;
        self.meta.root = root as usize;
        if changed {
            self.local = Matrix::zeros(0, 0);
        }
        self.resize(height as usize, width as usize);
        Ok(())
    }
}

/// Alignment of a `mine` dimension that matches a `theirs` dimension aligned
/// at `align`, if one exists
fn compatible_align(grid: &Grid, mine: Dist, theirs: Dist, align: usize) -> Option<usize> {
    match (mine, theirs) {
        (Dist::Star, _) | (Dist::Circ, _) => None,
        (a, b) if a == b => Some(align),
        (Dist::Mc, Dist::Vc) => Some(align % grid.height()),
        (Dist::Mr, Dist::Vr) => Some(align % grid.width()),
        (Dist::Vc, Dist::Mc) | (Dist::Vr, Dist::Mr) => Some(align),
        _ => None,
    }
}

impl<T: Element> DistRead<T> for DistMatrix<T> {
    #[inline]
    fn meta(&self) -> &DistMeta {
        &self.meta
    }

    #[inline]
    fn local(&self) -> MatrixRef<'_, T> {
        self.local.as_ref()
    }
}

impl<T: Element> DistWrite<T> for DistMatrix<T> {
    #[inline]
    fn local_mut(&mut self) -> MatrixMut<'_, T> {
        self.local.as_mut()
    }
}

impl<T: Element> std::fmt::Debug for DistMatrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistMatrix")
            .field("meta", &self.meta)
            .field("local", &self.local)
            .finish()
    }
}
