//! Distribution templates and the metadata of a distributed matrix
//!
//! Each dimension of a distributed matrix carries a [`Dist`] tag that says
//! how its indices are dealt to processes. Only the 14 pairs in
//! [`VALID_PAIRS`] are meaningful; constructing anything else panics.
//!
//! [`DistMeta`] collects the tags with the shape, alignments, constraint
//! flags, root and grid. Every query on it is a pure function, which is how
//! any process can say who owns an entry without communicating.

pub mod index;

use crate::comm::Comm;
use crate::grid::{CommKind, Coords, Grid};
use index::Span;
use std::fmt;
use std::sync::Arc;

/// How one matrix dimension is dealt to processes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dist {
    /// Cyclic over mesh rows (stride r)
    Mc,
    /// Cyclic over mesh columns (stride c)
    Mr,
    /// Cyclic over all processes in column-major order (stride p)
    Vc,
    /// Cyclic over all processes in row-major order (stride p)
    Vr,
    /// Cyclic along one diagonal path (stride lcm(r, c))
    Md,
    /// Replicated
    Star,
    /// Held by a single root process
    Circ,
}

impl Dist {
    /// Number of distinct owners along this dimension
    pub fn stride(self, grid: &Grid) -> usize {
        match self {
            Dist::Mc => grid.height(),
            Dist::Mr => grid.width(),
            Dist::Vc | Dist::Vr => grid.size(),
            Dist::Md => grid.lcm(),
            Dist::Star | Dist::Circ => 1,
        }
    }

    /// Owner index of the process at `coords` along this dimension
    pub fn rank_of(self, coords: &Coords) -> usize {
        match self {
            Dist::Mc => coords.mc,
            Dist::Mr => coords.mr,
            Dist::Vc => coords.vc,
            Dist::Vr => coords.vr,
            Dist::Md => coords.diag_path_rank,
            Dist::Star | Dist::Circ => 0,
        }
    }

    /// Communicator whose ranks are this dimension's owner indices
    pub fn comm_kind(self) -> CommKind {
        match self {
            Dist::Mc => CommKind::Mc,
            Dist::Mr => CommKind::Mr,
            Dist::Vc => CommKind::Vc,
            Dist::Vr => CommKind::Vr,
            Dist::Md => CommKind::Md,
            Dist::Star | Dist::Circ => CommKind::Own,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Dist::Mc => "MC",
            Dist::Mr => "MR",
            Dist::Vc => "VC",
            Dist::Vr => "VR",
            Dist::Md => "MD",
            Dist::Star => "STAR",
            Dist::Circ => "CIRC",
        }
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A (column, row) distribution pair
pub type DistPair = (Dist, Dist);

/// Every supported (column, row) pair
pub const VALID_PAIRS: [DistPair; 14] = [
    (Dist::Mc, Dist::Mr),
    (Dist::Mr, Dist::Mc),
    (Dist::Mc, Dist::Star),
    (Dist::Star, Dist::Mr),
    (Dist::Mr, Dist::Star),
    (Dist::Star, Dist::Mc),
    (Dist::Vc, Dist::Star),
    (Dist::Star, Dist::Vc),
    (Dist::Vr, Dist::Star),
    (Dist::Star, Dist::Vr),
    (Dist::Md, Dist::Star),
    (Dist::Star, Dist::Md),
    (Dist::Star, Dist::Star),
    (Dist::Circ, Dist::Circ),
];

/// Whether `(col, row)` is one of the [`VALID_PAIRS`]
pub fn is_valid_pair(col: Dist, row: Dist) -> bool {
    VALID_PAIRS.contains(&(col, row))
}

/// Shape, templates, alignment and grid of a distributed matrix
#[derive(Clone)]
pub struct DistMeta {
    grid: Arc<Grid>,
    col_dist: Dist,
    row_dist: Dist,
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) col_align: usize,
    pub(crate) row_align: usize,
    pub(crate) col_constrained: bool,
    pub(crate) row_constrained: bool,
    pub(crate) root: usize,
}

impl DistMeta {
    /// Empty, unaligned metadata for a `(col, row)` matrix on `grid`
    pub fn new(grid: &Arc<Grid>, col_dist: Dist, row_dist: Dist) -> Self {
        assert!(
            is_valid_pair(col_dist, row_dist),
            "[{col_dist},{row_dist}] is not a supported distribution pair"
        );
        Self {
            grid: Arc::clone(grid),
            col_dist,
            row_dist,
            height: 0,
            width: 0,
            col_align: 0,
            row_align: 0,
            col_constrained: false,
            row_constrained: false,
            root: 0,
        }
    }

    /// The grid the matrix lives on
    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub(crate) fn set_grid(&mut self, grid: &Arc<Grid>) {
        self.grid = Arc::clone(grid);
    }

    /// Column distribution (how rows are dealt)
    #[inline]
    pub fn col_dist(&self) -> Dist {
        self.col_dist
    }

    /// Row distribution (how columns are dealt)
    #[inline]
    pub fn row_dist(&self) -> Dist {
        self.row_dist
    }

    /// Both distributions
    #[inline]
    pub fn pair(&self) -> DistPair {
        (self.col_dist, self.row_dist)
    }

    /// Global height
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Global width
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Owner index of global row 0
    #[inline]
    pub fn col_align(&self) -> usize {
        self.col_align
    }

    /// Owner index of global column 0
    #[inline]
    pub fn row_align(&self) -> usize {
        self.row_align
    }

    /// Whether the column alignment was fixed explicitly
    #[inline]
    pub fn col_constrained(&self) -> bool {
        self.col_constrained
    }

    /// Whether the row alignment was fixed explicitly
    #[inline]
    pub fn row_constrained(&self) -> bool {
        self.row_constrained
    }

    /// Diagonal path id for `Md`, vc rank for `Circ`, 0 otherwise
    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    /// Stride of the column distribution
    #[inline]
    pub fn col_stride(&self) -> usize {
        self.col_dist.stride(&self.grid)
    }

    /// Stride of the row distribution
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_dist.stride(&self.grid)
    }

    /// Owner index of the calling process along the columns (0 off-grid)
    pub fn col_rank(&self) -> usize {
        self.grid.coords().map_or(0, |c| self.col_dist.rank_of(&c))
    }

    /// Owner index of the calling process along the rows (0 off-grid)
    pub fn row_rank(&self) -> usize {
        self.grid.coords().map_or(0, |c| self.row_dist.rank_of(&c))
    }

    /// First global row held by the calling process
    pub fn col_shift(&self) -> usize {
        index::shift(self.col_rank(), self.col_align, self.col_stride())
    }

    /// First global column held by the calling process
    pub fn row_shift(&self) -> usize {
        index::shift(self.row_rank(), self.row_align, self.row_stride())
    }

    /// Communicator over which the matrix is distributed
    pub fn dist_kind(&self) -> CommKind {
        match (self.col_dist, self.row_dist) {
            (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc) => CommKind::Vc,
            (col, Dist::Star) => col.comm_kind(),
            (Dist::Star, row) => row.comm_kind(),
            _ => CommKind::Own,
        }
    }

    /// Communicator over which copies are laid side by side (`Md`, `Circ`)
    pub fn cross_kind(&self) -> CommKind {
        match (self.col_dist, self.row_dist) {
            (Dist::Md, _) | (_, Dist::Md) => CommKind::MdPerp,
            (Dist::Circ, Dist::Circ) => CommKind::Vc,
            _ => CommKind::Own,
        }
    }

    /// Communicator over which identical copies are replicated
    pub fn redundant_kind(&self) -> CommKind {
        match (self.col_dist, self.row_dist) {
            (Dist::Mc, Dist::Star) | (Dist::Star, Dist::Mc) => CommKind::Mr,
            (Dist::Mr, Dist::Star) | (Dist::Star, Dist::Mr) => CommKind::Mc,
            (Dist::Star, Dist::Star) => CommKind::Vc,
            _ => CommKind::Own,
        }
    }

    /// See [`dist_kind`](Self::dist_kind); panics off-grid
    pub fn dist_comm(&self) -> &Comm {
        self.grid.comm(self.dist_kind())
    }

    /// See [`cross_kind`](Self::cross_kind); panics off-grid
    pub fn cross_comm(&self) -> &Comm {
        self.grid.comm(self.cross_kind())
    }

    /// See [`redundant_kind`](Self::redundant_kind); panics off-grid
    pub fn redundant_comm(&self) -> &Comm {
        self.grid.comm(self.redundant_kind())
    }

    /// Rank of the process at `coords` in the cross communicator
    pub fn cross_rank_of(&self, coords: &Coords) -> usize {
        self.grid.rank_in(self.cross_kind(), coords)
    }

    /// Rank of the process at `coords` in the redundant communicator
    pub fn redundant_rank_of(&self, coords: &Coords) -> usize {
        self.grid.rank_in(self.redundant_kind(), coords)
    }

    /// Whether the process at `coords` stores entries
    pub fn participating_at(&self, coords: &Coords) -> bool {
        self.cross_rank_of(coords) == self.root
    }

    /// Whether the calling process stores entries
    pub fn participating(&self) -> bool {
        self.grid.coords().is_some_and(|c| self.participating_at(&c))
    }

    /// Row and column index sets held by the process at `coords`
    pub fn spans_of(&self, coords: &Coords) -> (Span, Span) {
        if !self.participating_at(coords) {
            return (Span::EMPTY, Span::EMPTY);
        }
        let (cs, rs) = (self.col_stride(), self.row_stride());
        let col_shift = index::shift(self.col_dist.rank_of(coords), self.col_align, cs);
        let row_shift = index::shift(self.row_dist.rank_of(coords), self.row_align, rs);
        (Span::new(self.height, col_shift, cs), Span::new(self.width, row_shift, rs))
    }

    /// Index sets held by the calling process (empty off-grid)
    pub fn my_spans(&self) -> (Span, Span) {
        match self.grid.coords() {
            Some(coords) => self.spans_of(&coords),
            None => (Span::EMPTY, Span::EMPTY),
        }
    }

    /// Local height on the calling process
    pub fn local_height(&self) -> usize {
        self.my_spans().0.len
    }

    /// Local width on the calling process
    pub fn local_width(&self) -> usize {
        self.my_spans().1.len
    }

    /// Column owner index of global row `i`
    #[inline]
    pub fn row_owner(&self, i: usize) -> usize {
        index::owner(i, self.col_align, self.col_stride())
    }

    /// Row owner index of global column `j`
    #[inline]
    pub fn col_owner(&self, j: usize) -> usize {
        index::owner(j, self.row_align, self.row_stride())
    }

    /// Whether the process at `coords` holds a copy of entry (i, j)
    pub fn holds_at(&self, coords: &Coords, i: usize, j: usize) -> bool {
        self.participating_at(coords)
            && self.col_dist.rank_of(coords) == self.row_owner(i)
            && self.row_dist.rank_of(coords) == self.col_owner(j)
    }

    /// vc rank of the canonical holder of entry (i, j)
    ///
    /// Among the processes holding a copy this is the one with rank 0 in the
    /// redundant communicator.
    pub fn owner(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.height && j < self.width,
            "({i}, {j}) out of bounds for a {}x{} matrix",
            self.height,
            self.width
        );
        (0..self.grid.size())
            .map(|vc| self.grid.coords_of(vc))
            .find(|c| self.holds_at(c, i, j) && self.redundant_rank_of(c) == 0)
            .map(|c| c.vc)
            .unwrap_or_else(|| unreachable!("entry ({i}, {j}) has no owner"))
    }

    /// Rank, within the distribution communicator, of a holder of (i, j)
    pub fn dist_rank_of_owner(&self, i: usize, j: usize) -> usize {
        match (self.col_dist, self.row_dist) {
            (Dist::Mc, Dist::Mr) => self.grid.vc_at(self.row_owner(i), self.col_owner(j)),
            (Dist::Mr, Dist::Mc) => self.grid.vc_at(self.col_owner(j), self.row_owner(i)),
            (Dist::Star, Dist::Star) | (Dist::Circ, Dist::Circ) => 0,
            (_, Dist::Star) => self.row_owner(i),
            _ => self.col_owner(j),
        }
    }

    /// Whether the calling process holds entry (i, j)
    pub fn is_local(&self, i: usize, j: usize) -> bool {
        self.grid.coords().is_some_and(|c| self.holds_at(&c, i, j))
    }

    /// Local row index of held global row `i`
    #[inline]
    pub fn local_row(&self, i: usize) -> usize {
        i / self.col_stride()
    }

    /// Local column index of held global column `j`
    #[inline]
    pub fn local_col(&self, j: usize) -> usize {
        j / self.row_stride()
    }

    /// Global row of local row `il`
    #[inline]
    pub fn global_row(&self, il: usize) -> usize {
        index::global_index(il, self.col_shift(), self.col_stride())
    }

    /// Global column of local column `jl`
    #[inline]
    pub fn global_col(&self, jl: usize) -> usize {
        index::global_index(jl, self.row_shift(), self.row_stride())
    }

    fn diagonal_owner(&self, offset: isize) -> usize {
        assert!(
            matches!(self.pair(), (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc)),
            "diagonal alignment needs an [MC,MR] or [MR,MC] matrix"
        );
        let (i, j) = if offset >= 0 {
            (0, offset as usize)
        } else {
            (offset.unsigned_abs(), 0)
        };
        let (row_owner, col_owner) = (self.row_owner(i), self.col_owner(j));
        match self.pair() {
            (Dist::Mc, Dist::Mr) => self.grid.vc_at(row_owner, col_owner),
            _ => self.grid.vc_at(col_owner, row_owner),
        }
    }

    /// Diagonal path holding the `offset` diagonal
    pub fn diagonal_root(&self, offset: isize) -> usize {
        self.grid.diag_path(self.diagonal_owner(offset))
    }

    /// `Md` alignment of the `offset` diagonal along its path
    pub fn diagonal_align(&self, offset: isize) -> usize {
        self.grid.diag_path_rank(self.diagonal_owner(offset))
    }

    /// Same matrix seen with its dimensions exchanged
    pub fn transposed(&self) -> Self {
        Self {
            grid: Arc::clone(&self.grid),
            col_dist: self.row_dist,
            row_dist: self.col_dist,
            height: self.width,
            width: self.height,
            col_align: self.row_align,
            row_align: self.col_align,
            col_constrained: self.row_constrained,
            row_constrained: self.col_constrained,
            root: self.root,
        }
    }

    /// Metadata with another pair on the same grid, same shape, unaligned
    pub(crate) fn with_pair(&self, col_dist: Dist, row_dist: Dist) -> Self {
        let mut meta = Self::new(&self.grid, col_dist, row_dist);
        meta.height = self.height;
        meta.width = self.width;
        meta
    }

    /// Whether two metadata place every entry on the same processes
    pub fn same_layout(&self, other: &Self) -> bool {
        *self.grid == *other.grid
            && self.pair() == other.pair()
            && self.height == other.height
            && self.width == other.width
            && self.col_align == other.col_align
            && self.row_align == other.row_align
            && self.root == other.root
    }
}

impl fmt::Debug for DistMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}] {}x{} align=({}, {}) root={}",
            self.col_dist, self.row_dist, self.height, self.width, self.col_align, self.row_align, self.root
        )
    }
}
