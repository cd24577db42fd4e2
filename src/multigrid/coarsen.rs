//! Coarse problem generation and hierarchy construction.

use crate::config::MgConfig;
use crate::device::{Device, TransferGrid};
use crate::error::{MgError, Result};
use crate::geometry::{Geometry, GeometryGenerator, StructuredGeometry};
use crate::level::{CoarseLevel, SparseLevel};
use crate::mg_data::MgData;
use crate::problem::{
    generate_level, HaloSetup, ProblemAssembler, StencilAssembler, StructuredHalo,
};
use crate::vector::Vector;
use crate::{GlobalInt, LocalInt, UNMAPPED};

/// Builds coarse levels from fine ones.
///
/// The collaborators that describe, assemble and halo-complete a level are
/// type parameters; `new` picks the structured defaults.
pub struct CoarseProblemBuilder<
    'd,
    D: Device,
    G = StructuredGeometry,
    A = StencilAssembler,
    H = StructuredHalo,
> {
    device: &'d D,
    config: MgConfig,
    geometry: G,
    assembler: A,
    halo: H,
}

impl<'d, D: Device> CoarseProblemBuilder<'d, D> {
    pub fn new(device: &'d D, config: MgConfig) -> Self {
        let assembler = StencilAssembler::new(config.ordering);
        Self {
            device,
            config,
            geometry: StructuredGeometry,
            assembler,
            halo: StructuredHalo,
        }
    }
}

impl<'d, D, G, A, H> CoarseProblemBuilder<'d, D, G, A, H>
where
    D: Device,
    G: GeometryGenerator,
    A: ProblemAssembler,
    H: HaloSetup,
{
    pub fn with_collaborators(
        device: &'d D,
        config: MgConfig,
        geometry: G,
        assembler: A,
        halo: H,
    ) -> Self {
        Self {
            device,
            config,
            geometry,
            assembler,
            halo,
        }
    }

    pub fn config(&self) -> &MgConfig {
        &self.config
    }

    pub fn device(&self) -> &'d D {
        self.device
    }

    /// Assemble the finest level of a hierarchy from its descriptor.
    pub fn generate_fine_level(&self, geom: Geometry) -> Result<SparseLevel<D>> {
        let (nx, ny, nz) = (geom.nx, geom.ny, geom.nz);
        let _span = tracing::info_span!("generate_fine_level", nx, ny, nz).entered();
        generate_level(self.device, geom, &self.assembler, &self.halo)
    }

    /// Derive the half-resolution level of `fine` and the injection mapping
    /// between the two.
    ///
    /// `fine` is only read. The result is attached with
    /// `SparseLevel::attach_coarse`.
    pub fn generate_coarse_problem(&self, fine: &SparseLevel<D>) -> Result<CoarseLevel<D>> {
        let geom = fine.geometry();
        let (nxf, nyf, nzf) = (geom.nx, geom.ny, geom.nz);
        let _span = tracing::info_span!("generate_coarse_problem", nxf, nyf, nzf, rank = geom.rank)
            .entered();

        // Everything that can be rejected is rejected before the first allocation.
        if nxf % 2 != 0 || nyf % 2 != 0 || nzf % 2 != 0 {
            return Err(MgError::Precondition(format!(
                "fine grid {nxf}x{nyf}x{nzf} has an odd dimension"
            )));
        }
        let (coarse_rows, fine_points) = transfer_sizes([nxf, nyf, nzf])?;
        let (nxc, nyc, nzc) = (nxf / 2, nyf / 2, nzf / 2);
        let (zlc, zuc) = match geom.z_blocks() {
            Some((zl, zu)) => {
                if zl % 2 != 0 || zu % 2 != 0 {
                    return Err(MgError::Precondition(format!(
                        "z partition blocks {zl}/{zu} cannot be halved"
                    )));
                }
                (zl / 2, zu / 2)
            }
            None => (0, 0),
        };

        let grid = TransferGrid {
            coarse: [nxc, nyc, nzc],
            fine: [nxf, nyf, nzf],
        };
        let mut f2c = self.device.alloc_indices(coarse_rows)?;
        let mut c2f = self.device.alloc_indices(fine_points)?;
        self.device.fill_indices(&mut c2f, UNMAPPED)?;
        self.device.launch_f2c_operator(&grid, &mut f2c, &mut c2f)?;
        tracing::debug!(coarse_rows, fine_points, "f2c operator launched");

        let coarse_geom = self.geometry.build(
            geom.size,
            geom.rank,
            geom.num_threads,
            geom.pz,
            zlc,
            zuc,
            nxc,
            nyc,
            nzc,
            geom.npx,
            geom.npy,
            geom.npz,
        )?;
        let level = generate_level(self.device, coarse_geom, &self.assembler, &self.halo)?;
        if level.local_rows() != coarse_rows {
            return Err(MgError::Setup(format!(
                "coarse level assembled {} rows, expected {coarse_rows}",
                level.local_rows()
            )));
        }

        let rc = Vector::on_device(self.device, level.local_rows())?;
        let xc = Vector::on_device(self.device, level.local_cols())?;
        let axf = if self.config.reference_check {
            Vector::on_device(self.device, fine.local_cols())?
        } else {
            Vector::deferred(fine.local_cols())
        };

        tracing::debug!(
            rows = level.local_rows(),
            cols = level.local_cols(),
            nnz = level.nnz(),
            "coarse level generated"
        );
        Ok(CoarseLevel {
            level,
            mg_data: MgData::new(f2c, c2f, rc, xc, axf),
        })
    }

    /// Coarsen `fine` repeatedly until the chain has `num_levels` levels.
    ///
    /// Each coarse level is attached before it is coarsened in turn.
    pub fn build_hierarchy(&self, fine: &mut SparseLevel<D>) -> Result<()> {
        let _span =
            tracing::info_span!("build_hierarchy", levels = self.config.num_levels).entered();
        self.coarsen_below(fine, 1)
    }

    fn coarsen_below(&self, level: &mut SparseLevel<D>, depth: usize) -> Result<()> {
        if depth >= self.config.num_levels {
            return Ok(());
        }
        let coarse = self.generate_coarse_problem(level)?;
        let next = level.attach_coarse(coarse)?;
        self.coarsen_below(next, depth + 1)
    }
}

/// Coarse row count and fine point count for an even fine grid. Both must be
/// addressable with `LocalInt`, since f2c stores fine indices and c2f coarse
/// ones.
fn transfer_sizes(fine: [LocalInt; 3]) -> Result<(usize, usize)> {
    let [nxf, nyf, nzf] = fine;
    let (nxc, nyc, nzc) = (nxf / 2, nyf / 2, nzf / 2);
    let coarse_rows = nxc as GlobalInt * nyc as GlobalInt * nzc as GlobalInt;
    if coarse_rows == 0 {
        return Err(MgError::Precondition(format!(
            "coarse grid {nxc}x{nyc}x{nzc} has no rows"
        )));
    }
    let coarse_rows = LocalInt::try_from(coarse_rows).map_err(|_| {
        MgError::Precondition(format!(
            "{coarse_rows} coarse rows do not fit the local index type"
        ))
    })?;
    let fine_points = nxf as GlobalInt * nyf as GlobalInt * nzf as GlobalInt;
    let fine_points = LocalInt::try_from(fine_points).map_err(|_| {
        MgError::Precondition(format!(
            "{fine_points} fine points do not fit the local index type"
        ))
    })?;
    Ok((coarse_rows as usize, fine_points as usize))
}
