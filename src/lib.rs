//! Coarse-grid construction and prolongation for the multigrid preconditioner
//! of a GPU conjugate-gradient benchmark.
//!
//! A fine `SparseLevel` is coarsened by `CoarseProblemBuilder` into a chain of
//! progressively coarser levels, each linked to its parent through `MgData`,
//! the fine↔coarse injection mapping. `compute_prolongation` adds a coarse
//! correction back into the fine solution through that mapping.

pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod level;
pub mod mg_data;
pub mod multigrid;
pub mod output;
pub mod problem;
pub mod sparse;
pub mod stats;
pub mod vector;

/// Per-process index type. Matches the 32-bit integers used by the GPU kernels.
pub type LocalInt = u32;

/// Global index type, wide enough for products of global dimensions.
pub type GlobalInt = u64;

/// Coarse→fine entry for a fine point that no coarse row maps to.
pub const UNMAPPED: LocalInt = LocalInt::MAX;

pub use config::{MgConfig, Ordering};
pub use device::{Device, HostDevice, WgpuDevice};
pub use error::{MgError, Result};
pub use geometry::{Geometry, GeometryGenerator, StructuredGeometry};
pub use level::{CoarseLevel, SparseLevel};
pub use mg_data::MgData;
pub use multigrid::{
    compute_prolongation, copy_coarse_problem_to_host, copy_hierarchy_to_host, CoarseProblemBuilder,
};
pub use vector::Vector;
