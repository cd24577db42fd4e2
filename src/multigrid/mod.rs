//! Coarse-level construction, prolongation and host mirroring.

mod coarsen;
mod host_mirror;
mod prolongation;

pub use coarsen::CoarseProblemBuilder;
pub use host_mirror::{copy_coarse_problem_to_host, copy_hierarchy_to_host};
pub use prolongation::compute_prolongation;
