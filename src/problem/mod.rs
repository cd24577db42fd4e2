//! Problem generation for a described level: nonzero structure and halo.
//!
//! Both steps sit behind traits so the hierarchy builder does not depend on
//! the stencil or on how neighbor metadata is derived.

mod assembler;
mod halo;

pub use assembler::StencilAssembler;
pub use halo::StructuredHalo;

use crate::device::Device;
use crate::error::{MgError, Result};
use crate::geometry::Geometry;
use crate::level::SparseLevel;

/// Fills a freshly initialized level with its rows and row permutation.
///
/// Implementations finish by calling `SparseLevel::set_problem`.
pub trait ProblemAssembler {
    fn populate<D: Device>(&self, device: &D, level: &mut SparseLevel<D>) -> Result<()>;
}

/// Turns assembled rows into local column indices plus neighbor metadata.
///
/// Implementations start from `SparseLevel::take_assembled` and finish by
/// calling `SparseLevel::set_halo`.
pub trait HaloSetup {
    fn setup<D: Device>(&self, device: &D, level: &mut SparseLevel<D>) -> Result<()>;
}

/// Describe, assemble and halo-complete a level.
pub fn generate_level<D: Device>(
    device: &D,
    geom: Geometry,
    assembler: &impl ProblemAssembler,
    halo: &impl HaloSetup,
) -> Result<SparseLevel<D>> {
    let mut level = SparseLevel::initialize(geom);
    assembler.populate(device, &mut level)?;
    halo.setup(device, &mut level)?;
    if !level.is_usable() {
        return Err(MgError::Setup(
            "problem assembly and halo setup left the level incomplete".into(),
        ));
    }
    Ok(level)
}
