//! Per-process environment: world communicator, configuration, default grid
//!
//! There is no global state. Each SPMD process builds one [`Environment`]
//! from its world [`Comm`] and passes it (or the grids it hands out) to the
//! routines it calls.

use crate::comm::{Comm, LocalTransport};
use crate::error::{Error, Result};
use crate::grid::Grid;
use parking_lot::{Mutex, MutexGuard};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default algorithmic block size
pub const DEFAULT_BLOCK_SIZE: usize = 128;

const ENV_BLOCK_SIZE: &str = "DISTLA_BLOCK_SIZE";
const ENV_SEED: &str = "DISTLA_SEED";
const ENV_RECV_TIMEOUT_MS: &str = "DISTLA_RECV_TIMEOUT_MS";

/// Default seed for the generator of process `rank`
pub fn default_seed(rank: usize) -> u64 {
    (21 << 16) | (rank as u64 & 0xFFFF)
}

/// Runtime configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Algorithmic block size for blocked kernels
    pub block_size: usize,
    /// Base seed; each process mixes in its rank. `None` uses [`default_seed`].
    pub seed: Option<u64>,
    /// Receive deadline for [`LocalTransport`]; `None` blocks forever
    pub recv_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            seed: None,
            recv_timeout: None,
        }
    }
}

impl Config {
    /// Read overrides from `DISTLA_BLOCK_SIZE`, `DISTLA_SEED` and
    /// `DISTLA_RECV_TIMEOUT_MS`; unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_BLOCK_SIZE) {
            let nb: usize = raw
                .trim()
                .parse()
                .map_err(|e| Error::invalid_argument(ENV_BLOCK_SIZE, format!("{raw:?}: {e}")))?;
            if nb == 0 {
                return Err(Error::invalid_argument(ENV_BLOCK_SIZE, "must be positive"));
            }
            config.block_size = nb;
        }
        if let Some(raw) = lookup(ENV_SEED) {
            let seed = raw
                .trim()
                .parse()
                .map_err(|e| Error::invalid_argument(ENV_SEED, format!("{raw:?}: {e}")))?;
            config.seed = Some(seed);
        }
        if let Some(raw) = lookup(ENV_RECV_TIMEOUT_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|e| Error::invalid_argument(ENV_RECV_TIMEOUT_MS, format!("{raw:?}: {e}")))?;
            config.recv_timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }

    /// Seed for the generator of process `rank`
    pub fn seed_for(&self, rank: usize) -> u64 {
        match self.seed {
            Some(base) => base ^ default_seed(rank),
            None => default_seed(rank),
        }
    }
}

/// Tuning knobs shared by an environment and the grids it builds
#[derive(Debug)]
pub struct Tuning {
    block_size: AtomicUsize,
}

impl Tuning {
    /// Tuning with the given block size
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size: AtomicUsize::new(block_size),
        }
    }

    /// Current algorithmic block size
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    fn replace_block_size(&self, block_size: usize) -> usize {
        assert!(block_size > 0, "block size must be positive");
        self.block_size.swap(block_size, Ordering::Relaxed)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

/// Restores the previous block size when dropped
#[derive(Debug)]
#[must_use = "the block size reverts as soon as the guard is dropped"]
pub struct BlockSizeGuard<'a> {
    tuning: &'a Tuning,
    previous: usize,
}

impl Drop for BlockSizeGuard<'_> {
    fn drop(&mut self) {
        self.tuning.replace_block_size(self.previous);
    }
}

/// Everything one SPMD process needs
#[derive(Debug)]
pub struct Environment {
    world: Comm,
    config: Config,
    tuning: Arc<Tuning>,
    default_grid: Mutex<Option<Arc<Grid>>>,
    rng: Mutex<StdRng>,
}

impl Environment {
    /// Environment for the process holding `world`
    pub fn new(world: Comm, config: Config) -> Self {
        let rng = StdRng::seed_from_u64(config.seed_for(world.rank()));
        Self {
            tuning: Arc::new(Tuning::new(config.block_size)),
            world,
            config,
            default_grid: Mutex::new(None),
            rng: Mutex::new(rng),
        }
    }

    /// One environment per rank over a fresh [`LocalTransport`]
    pub fn universe(size: usize, config: Config) -> Vec<Environment> {
        LocalTransport::universe_with_timeout(size, config.recv_timeout)
            .into_iter()
            .map(|world| Environment::new(world, config.clone()))
            .collect()
    }

    /// The world communicator
    #[inline]
    pub fn world(&self) -> &Comm {
        &self.world
    }

    /// The configuration this environment was built with
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared tuning knobs
    #[inline]
    pub fn tuning(&self) -> &Arc<Tuning> {
        &self.tuning
    }

    /// Current algorithmic block size
    #[inline]
    pub fn block_size(&self) -> usize {
        self.tuning.block_size()
    }

    /// Override the block size until the guard is dropped
    pub fn scoped_block_size(&self, block_size: usize) -> BlockSizeGuard<'_> {
        let previous = self.tuning.replace_block_size(block_size);
        BlockSizeGuard {
            tuning: &self.tuning,
            previous,
        }
    }

    /// The grid over the whole world, built on first use
    ///
    /// The first call is collective over the world communicator.
    pub fn default_grid(&self) -> Result<Arc<Grid>> {
        let mut slot = self.default_grid.lock();
        if let Some(grid) = slot.as_ref() {
            return Ok(Arc::clone(grid));
        }
        let grid = self.grid_builder(&self.world).build()?;
        *slot = Some(Arc::clone(&grid));
        Ok(grid)
    }

    /// Grid over `comm` sharing this environment's tuning; collective
    pub fn grid(&self, comm: &Comm, height: usize) -> Result<Arc<Grid>> {
        self.grid_builder(comm).height(height).build()
    }

    /// Builder preloaded with this environment's tuning
    pub fn grid_builder<'a>(&self, comm: &'a Comm) -> crate::grid::GridBuilder<'a> {
        Grid::builder(comm).tuning(Arc::clone(&self.tuning))
    }

    /// This process's random generator
    pub fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock()
    }
}
