//! # distla
//!
//! **Distributed dense linear algebra over a two-dimensional process grid.**
//!
//! distla stores a matrix across `p` SPMD processes arranged as an `r × c`
//! grid. Each matrix carries a pair of distribution tags (`[MC,MR]`,
//! `[VC,STAR]`, `[STAR,STAR]`, ...) that decide which process owns which
//! entry, and assigning between two matrices redistributes the entries with
//! collective communication.
//!
//! ## Layers
//!
//! - **Transport**: [`comm::Comm`] collectives over a pluggable
//!   [`comm::Transport`]; [`comm::LocalTransport`] runs the processes as
//!   threads of one program
//! - **Layout**: [`grid::Grid`], [`dist::Dist`] and [`dist::DistMeta`]
//! - **Storage**: [`dist_matrix::DistMatrix`] and its borrowed views
//! - **Redistribution**: [`redist`], used implicitly by `assign`
//! - **Kernels**: [`blas`] and [`lapack`], written against
//!   [`dist_matrix::DistRead`]/[`dist_matrix::DistWrite`]
//! - **Generators and I/O**: [`matrices`] and [`io`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use distla::prelude::*;
//!
//! let worlds = LocalTransport::universe(4);
//! std::thread::scope(|s| {
//!     for world in worlds {
//!         s.spawn(move || -> Result<()> {
//!             let env = Environment::new(world, Config::default());
//!             let grid = env.default_grid()?;
//!             let a = DistMatrix::<f64>::from_fn(&grid, Dist::Mc, Dist::Mr, 8, 8, |i, j| (i + j) as f64);
//!             let b = a.to_star_star()?;
//!             assert_eq!(b.get_local(3, 4), 7.0);
//!             Ok(())
//!         });
//!     }
//! });
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): multi-threaded local kernels

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod blas;
pub mod comm;
pub mod dist;
pub mod dist_matrix;
pub mod dtype;
pub mod env;
pub mod error;
pub mod grid;
pub mod io;
pub mod lapack;
pub mod matrices;
pub mod matrix;
pub mod redist;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blas::{Orientation, Side, UnitOrNonUnit, UpperOrLower};
    pub use crate::comm::{Comm, LocalTransport, ReduceOp};
    pub use crate::dist::{Dist, DistMeta};
    pub use crate::dist_matrix::{DistMatrix, DistRead, DistView, DistViewMut, DistWrite};
    pub use crate::dtype::{Complex64, Complex128, DType, Element, Field, RealField};
    pub use crate::env::{Config, Environment};
    pub use crate::error::{Error, Result};
    pub use crate::grid::{CommKind, Grid};
    pub use crate::matrix::Matrix;
}
