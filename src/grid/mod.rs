//! The 2-D process mesh
//!
//! A [`Grid`] arranges the owning processes of a communicator as an r×c mesh
//! in column-major order: process `vc` sits at mesh row `mc = vc mod r` and
//! mesh column `mr = vc / r`. The row-major rank is `vr = mr + mc·c`.
//!
//! Besides the mesh communicators, processes are threaded onto `gcd(r, c)`
//! diagonal paths of length `lcm(r, c)`: path `d` starts at mesh position
//! (0, d) and steps by (+1, +1). These carry the `Md` distribution used for
//! matrix diagonals.
//!
//! Every coordinate of every process is computable locally through
//! [`Grid::coords_of`], which is what lets the redistribution code place data
//! without asking anyone.

use crate::comm::Comm;
use crate::env::Tuning;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// The communicators a grid derives
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommKind {
    /// All owners in column-major order
    Vc,
    /// All owners in row-major order
    Vr,
    /// One mesh column: processes sharing `mr`, ranked by `mc`
    Mc,
    /// One mesh row: processes sharing `mc`, ranked by `mr`
    Mr,
    /// One diagonal path, ranked by position along the path
    Md,
    /// Processes at the same position on every path, ranked by path
    MdPerp,
    /// The calling process alone
    Own,
}

/// Mesh coordinates of one owning process
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Coords {
    /// Column-major rank
    pub vc: usize,
    /// Row-major rank
    pub vr: usize,
    /// Mesh row
    pub mc: usize,
    /// Mesh column
    pub mr: usize,
    /// Diagonal path id
    pub diag_path: usize,
    /// Position along the diagonal path
    pub diag_path_rank: usize,
}

#[derive(Debug)]
struct GridComms {
    vc: Comm,
    vr: Comm,
    mc: Comm,
    mr: Comm,
    md: Comm,
    md_perp: Comm,
    own: Comm,
}

/// An r×c process mesh over a communicator
pub struct Grid {
    viewing: Comm,
    height: usize,
    width: usize,
    gcd: usize,
    lcm: usize,
    vc_to_viewing: Vec<usize>,
    viewing_to_vc: Vec<Option<usize>>,
    diag_path: Vec<usize>,
    diag_path_rank: Vec<usize>,
    coords: Option<Coords>,
    comms: Option<GridComms>,
    tuning: Arc<Tuning>,
}

/// Largest divisor of `p` that does not exceed `sqrt(p)`
pub fn find_factor(p: usize) -> usize {
    assert!(p > 0, "cannot factor an empty process set");
    let mut factor = (p as f64).sqrt() as usize;
    while factor * factor > p {
        factor -= 1;
    }
    while (factor + 1) * (factor + 1) <= p {
        factor += 1;
    }
    while p % factor != 0 {
        factor -= 1;
    }
    factor
}

pub(crate) fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Builder for [`Grid`]
///
/// `build` is collective over the communicator.
#[derive(Debug)]
pub struct GridBuilder<'a> {
    comm: &'a Comm,
    height: Option<usize>,
    owners: Option<Vec<usize>>,
    tuning: Option<Arc<Tuning>>,
}

impl<'a> GridBuilder<'a> {
    /// Mesh height r (defaults to [`find_factor`] of the owner count)
    pub fn height(mut self, height: usize) -> Self {
        self.height = Some(height);
        self
    }

    /// Ranks of the communicator that own data, in vc order
    /// (defaults to all of them)
    pub fn owners(mut self, owners: Vec<usize>) -> Self {
        self.owners = Some(owners);
        self
    }

    /// Tuning knobs shared with the grid (block size)
    pub fn tuning(mut self, tuning: Arc<Tuning>) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Construct the grid; collective over the communicator
    pub fn build(self) -> Result<Arc<Grid>> {
        let viewing = self.comm.dup()?;
        let owners = self.owners.unwrap_or_else(|| (0..viewing.size()).collect());
        let size = owners.len();
        assert!(size > 0, "a grid needs at least one owning process");
        let height = self.height.unwrap_or_else(|| find_factor(size));
        assert!(
            height > 0 && size % height == 0,
            "grid height {height} does not divide {size} processes"
        );
        let width = size / height;

        let mut viewing_to_vc = vec![None; viewing.size()];
        for (vc, &rank) in owners.iter().enumerate() {
            assert!(rank < viewing.size(), "owner rank {rank} is not in the communicator");
            assert!(viewing_to_vc[rank].is_none(), "owner rank {rank} listed twice");
            viewing_to_vc[rank] = Some(vc);
        }

        let g = gcd(height, width);
        let lcm = height * width / g;
        let mut diag_path = vec![0; size];
        let mut diag_path_rank = vec![0; size];
        for path in 0..g {
            let (mut i, mut k) = (0, path);
            for step in 0..lcm {
                let vc = i + k * height;
                diag_path[vc] = path;
                diag_path_rank[vc] = step;
                i = (i + 1) % height;
                k = (k + 1) % width;
            }
        }

        let my_vc = viewing_to_vc[viewing.rank()];
        let owning = viewing.split(my_vc.map(|_| 0), my_vc.unwrap_or(0))?;

        let mut grid = Grid {
            viewing,
            height,
            width,
            gcd: g,
            lcm,
            vc_to_viewing: owners,
            viewing_to_vc,
            diag_path,
            diag_path_rank,
            coords: None,
            comms: None,
            tuning: self.tuning.unwrap_or_default(),
        };

        if let (Some(vc), Some(owning)) = (my_vc, owning) {
            let coords = grid.coords_of(vc);
            let sub = |color: usize, key: usize| -> Result<Comm> {
                owning
                    .split(Some(color as u64), key)?
                    .ok_or_else(|| Error::Transport("grid split dropped an owner".into()))
            };
            let vr = sub(0, coords.vr)?;
            let mc = sub(coords.mr, coords.mc)?;
            let mr = sub(coords.mc, coords.mr)?;
            let md = sub(coords.diag_path, coords.diag_path_rank)?;
            let md_perp = sub(coords.diag_path_rank, coords.diag_path)?;
            let own = owning.self_comm();
            grid.coords = Some(coords);
            grid.comms = Some(GridComms {
                vc: owning,
                vr,
                mc,
                mr,
                md,
                md_perp,
                own,
            });
        }
        tracing::debug!(height, width, in_grid = grid.in_grid(), "constructed process grid");
        Ok(Arc::new(grid))
    }
}

impl Grid {
    /// Start building a grid over `comm`
    pub fn builder(comm: &Comm) -> GridBuilder<'_> {
        GridBuilder {
            comm,
            height: None,
            owners: None,
            tuning: None,
        }
    }

    /// Grid over every rank of `comm` with the default mesh shape
    pub fn new(comm: &Comm) -> Result<Arc<Grid>> {
        Self::builder(comm).build()
    }

    /// Grid over every rank of `comm` with `height` mesh rows
    pub fn with_height(comm: &Comm, height: usize) -> Result<Arc<Grid>> {
        Self::builder(comm).height(height).build()
    }

    /// Grid whose data lives on the listed ranks of `comm` only
    pub fn with_owners(comm: &Comm, owners: Vec<usize>, height: usize) -> Result<Arc<Grid>> {
        Self::builder(comm).owners(owners).height(height).build()
    }

    /// Mesh height r
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Mesh width c
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of owning processes, r·c
    #[inline]
    pub fn size(&self) -> usize {
        self.height * self.width
    }

    /// gcd(r, c): the number of diagonal paths
    #[inline]
    pub fn gcd(&self) -> usize {
        self.gcd
    }

    /// lcm(r, c): the length of each diagonal path
    #[inline]
    pub fn lcm(&self) -> usize {
        self.lcm
    }

    /// Whether the calling process owns data on this grid
    #[inline]
    pub fn in_grid(&self) -> bool {
        self.coords.is_some()
    }

    /// Coordinates of the calling process, if it is in the grid
    #[inline]
    pub fn coords(&self) -> Option<Coords> {
        self.coords
    }

    /// Coordinates of the calling process; panics off-grid
    pub fn my_coords(&self) -> Coords {
        match self.coords {
            Some(coords) => coords,
            None => panic!("process is not in the grid"),
        }
    }

    /// Mesh row of the calling process
    pub fn mc_rank(&self) -> Option<usize> {
        self.coords.map(|c| c.mc)
    }

    /// Mesh column of the calling process
    pub fn mr_rank(&self) -> Option<usize> {
        self.coords.map(|c| c.mr)
    }

    /// Column-major rank of the calling process
    pub fn vc_rank(&self) -> Option<usize> {
        self.coords.map(|c| c.vc)
    }

    /// Row-major rank of the calling process
    pub fn vr_rank(&self) -> Option<usize> {
        self.coords.map(|c| c.vr)
    }

    /// Coordinates of the owner with column-major rank `vc`
    pub fn coords_of(&self, vc: usize) -> Coords {
        assert!(vc < self.size(), "vc rank {vc} out of range");
        let mc = vc % self.height;
        let mr = vc / self.height;
        Coords {
            vc,
            vr: mr + mc * self.width,
            mc,
            mr,
            diag_path: self.diag_path[vc],
            diag_path_rank: self.diag_path_rank[vc],
        }
    }

    /// Column-major rank of the process at (mc, mr)
    #[inline]
    pub fn vc_at(&self, mc: usize, mr: usize) -> usize {
        mc + mr * self.height
    }

    /// Column-major rank of row-major rank `vr`
    #[inline]
    pub fn vr_to_vc(&self, vr: usize) -> usize {
        self.vc_at(vr / self.width, vr % self.width)
    }

    /// Column-major rank of the process at `step` along diagonal `path`
    pub fn vc_on_path(&self, path: usize, step: usize) -> usize {
        self.vc_at(step % self.height, (path + step) % self.width)
    }

    /// First process on a diagonal path
    pub fn first_vc_rank(&self, path: usize) -> usize {
        self.vc_on_path(path, 0)
    }

    /// Diagonal path of process `vc`
    #[inline]
    pub fn diag_path(&self, vc: usize) -> usize {
        self.diag_path[vc]
    }

    /// Position of process `vc` along its diagonal path
    #[inline]
    pub fn diag_path_rank(&self, vc: usize) -> usize {
        self.diag_path_rank[vc]
    }

    /// Viewing rank of owner `vc`
    #[inline]
    pub fn vc_to_viewing(&self, vc: usize) -> usize {
        self.vc_to_viewing[vc]
    }

    /// Owner rank of a viewing rank, if that process owns data
    #[inline]
    pub fn viewing_to_vc(&self, rank: usize) -> Option<usize> {
        self.viewing_to_vc[rank]
    }

    /// The communicator every process of the grid belongs to
    #[inline]
    pub fn viewing_comm(&self) -> &Comm {
        &self.viewing
    }

    /// The communicator over the owning processes (`None` off-grid)
    pub fn owning_comm(&self) -> Option<&Comm> {
        self.comms.as_ref().map(|c| &c.vc)
    }

    /// One of the mesh communicators; panics off-grid
    pub fn comm(&self, kind: CommKind) -> &Comm {
        let Some(comms) = self.comms.as_ref() else {
            panic!("process is not in the grid and holds no {kind:?} communicator");
        };
        match kind {
            CommKind::Vc => &comms.vc,
            CommKind::Vr => &comms.vr,
            CommKind::Mc => &comms.mc,
            CommKind::Mr => &comms.mr,
            CommKind::Md => &comms.md,
            CommKind::MdPerp => &comms.md_perp,
            CommKind::Own => &comms.own,
        }
    }

    /// Rank that the process with `coords` holds in communicator `kind`
    pub fn rank_in(&self, kind: CommKind, coords: &Coords) -> usize {
        match kind {
            CommKind::Vc => coords.vc,
            CommKind::Vr => coords.vr,
            CommKind::Mc => coords.mc,
            CommKind::Mr => coords.mr,
            CommKind::Md => coords.diag_path_rank,
            CommKind::MdPerp => coords.diag_path,
            CommKind::Own => 0,
        }
    }

    /// Column-major rank of member `rank` of the calling process's
    /// communicator `kind`
    pub fn member_vc(&self, kind: CommKind, rank: usize) -> usize {
        let me = self.my_coords();
        match kind {
            CommKind::Vc => rank,
            CommKind::Vr => self.vr_to_vc(rank),
            CommKind::Mc => self.vc_at(rank, me.mr),
            CommKind::Mr => self.vc_at(me.mc, rank),
            CommKind::Md => self.vc_on_path(me.diag_path, rank),
            CommKind::MdPerp => self.vc_on_path(rank, me.diag_path_rank),
            CommKind::Own => me.vc,
        }
    }

    /// Algorithmic block size for blocked kernels
    #[inline]
    pub fn block_size(&self) -> usize {
        self.tuning.block_size()
    }

    /// The tuning knobs this grid reads
    pub fn tuning(&self) -> &Arc<Tuning> {
        &self.tuning
    }
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.viewing.same_as(&other.viewing) && self.height == other.height && self.width == other.width
    }
}

impl Eq for Grid {}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("coords", &self.coords)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_factor() {
        assert_eq!(find_factor(1), 1);
        assert_eq!(find_factor(4), 2);
        assert_eq!(find_factor(6), 2);
        assert_eq!(find_factor(7), 1);
        assert_eq!(find_factor(12), 3);
        assert_eq!(find_factor(16), 4);
        assert_eq!(find_factor(18), 3);
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(2, 3), 1);
        assert_eq!(gcd(4, 6), 2);
        assert_eq!(gcd(5, 5), 5);
    }
}
