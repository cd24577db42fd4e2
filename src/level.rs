//! One level of the multigrid hierarchy and the owned link to its coarser level.

use crate::device::{Device, DeviceBuffer};
use crate::error::{MgError, Result};
use crate::geometry::Geometry;
use crate::mg_data::MgData;
use crate::sparse::CsrMatrix;
use crate::{GlobalInt, LocalInt};

/// CSR structure resident on the device.
pub struct DeviceMatrix<D: Device> {
    pub row_pointers: D::Indices,
    pub col_indices: D::Indices,
    pub values: D::Values,
    pub nnz: usize,
}

/// Neighbor metadata produced by halo setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaloInfo {
    /// Columns owned by other ranks, appended after the local rows.
    pub num_external: usize,
    /// Ranks this rank exchanges boundary values with, ascending.
    pub neighbors: Vec<usize>,
    /// Per neighbor: number of external columns received from it.
    pub receive_lengths: Vec<usize>,
    /// Per neighbor: number of local rows sent to it.
    pub send_lengths: Vec<usize>,
    pub total_to_send: usize,
}

/// Host-resident copies of a level's device data.
#[derive(Debug, Clone, Default)]
pub struct HostLevel {
    pub matrix: Option<CsrMatrix<LocalInt>>,
    pub perm: Option<Vec<LocalInt>>,
    /// Local rows packed into the send buffer, grouped by neighbor.
    pub elements_to_send: Option<Vec<LocalInt>>,
}

/// A coarse level together with the transfer data linking it to its parent.
pub struct CoarseLevel<D: Device> {
    pub level: SparseLevel<D>,
    pub mg_data: MgData<D>,
}

/// A problem level: descriptor, device-resident structure and row
/// permutation, halo metadata, and at most one owned coarser level.
pub struct SparseLevel<D: Device> {
    geom: Geometry,
    total_rows: GlobalInt,
    local_rows: usize,
    local_cols: usize,
    assembled: Option<CsrMatrix<GlobalInt>>,
    matrix: Option<DeviceMatrix<D>>,
    perm: Option<D::Indices>,
    halo: HaloInfo,
    elements_to_send: Option<D::Indices>,
    host: HostLevel,
    coarse: Option<Box<CoarseLevel<D>>>,
}

impl<D: Device> SparseLevel<D> {
    /// An empty level for `geom`, to be filled by a problem assembler and halo setup.
    pub fn initialize(geom: Geometry) -> Self {
        let total_rows = geom.global_points();
        Self {
            geom,
            total_rows,
            local_rows: 0,
            local_cols: 0,
            assembled: None,
            matrix: None,
            perm: None,
            halo: HaloInfo::default(),
            elements_to_send: None,
            host: HostLevel::default(),
            coarse: None,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    pub fn total_rows(&self) -> GlobalInt {
        self.total_rows
    }

    pub fn local_rows(&self) -> usize {
        self.local_rows
    }

    /// Local rows plus external (halo) columns.
    pub fn local_cols(&self) -> usize {
        self.local_cols
    }

    pub fn nnz(&self) -> usize {
        self.matrix.as_ref().map_or(0, |m| m.nnz)
    }

    pub fn halo(&self) -> &HaloInfo {
        &self.halo
    }

    pub fn matrix(&self) -> Option<&DeviceMatrix<D>> {
        self.matrix.as_ref()
    }

    /// Row permutation: row `i` of this level is stored at position `perm[i]`.
    pub fn perm(&self) -> Option<&D::Indices> {
        self.perm.as_ref()
    }

    pub fn elements_to_send(&self) -> Option<&D::Indices> {
        self.elements_to_send.as_ref()
    }

    pub fn host(&self) -> &HostLevel {
        &self.host
    }

    /// Whether assembly and halo setup both completed.
    pub fn is_usable(&self) -> bool {
        self.matrix.is_some() && self.perm.is_some() && self.assembled.is_none()
    }

    /// Record the assembled rows (global column indices) and upload the row permutation.
    ///
    /// Called by a problem assembler.
    pub fn set_problem(
        &mut self,
        device: &D,
        rows: CsrMatrix<GlobalInt>,
        perm: &[LocalInt],
    ) -> Result<()> {
        if perm.len() != rows.nrows {
            return Err(MgError::Setup(format!(
                "permutation of length {} for {} rows",
                perm.len(),
                rows.nrows
            )));
        }
        // Prolongation scatters through this without atomics; it must be a bijection.
        let mut seen = vec![false; perm.len()];
        for &p in perm {
            match seen.get_mut(p as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(MgError::Setup(format!(
                        "row permutation repeats or exceeds position {p}"
                    )))
                }
            }
        }
        self.perm = Some(device.upload_indices(perm)?);
        self.local_rows = rows.nrows;
        self.local_cols = rows.nrows;
        self.assembled = Some(rows);
        Ok(())
    }

    /// Hand the assembled rows to halo setup.
    pub fn take_assembled(&mut self) -> Result<CsrMatrix<GlobalInt>> {
        self.assembled
            .take()
            .ok_or_else(|| MgError::Setup("halo setup ran before problem assembly".into()))
    }

    /// Install the locally indexed structure and halo metadata on the device.
    ///
    /// Called by halo setup.
    pub fn set_halo(
        &mut self,
        device: &D,
        local: CsrMatrix<LocalInt>,
        halo: HaloInfo,
        elements_to_send: &[LocalInt],
    ) -> Result<()> {
        if local.nrows != self.local_rows || local.ncols != self.local_rows + halo.num_external {
            return Err(MgError::Setup(format!(
                "local structure {}x{} does not match {} rows with {} external columns",
                local.nrows, local.ncols, self.local_rows, halo.num_external
            )));
        }
        if elements_to_send.len() != halo.total_to_send {
            return Err(MgError::Setup(format!(
                "send list of {} entries, expected {}",
                elements_to_send.len(),
                halo.total_to_send
            )));
        }
        let row_pointers = local.row_pointers_local().ok_or_else(|| {
            MgError::Setup(format!("{} nonzeros overflow the local index type", local.nnz()))
        })?;
        self.matrix = Some(DeviceMatrix {
            row_pointers: device.upload_indices(&row_pointers)?,
            col_indices: device.upload_indices(&local.col_indices)?,
            values: device.upload_values(&local.values)?,
            nnz: local.nnz(),
        });
        self.elements_to_send = Some(device.upload_indices(elements_to_send)?);
        self.local_cols = local.ncols;
        self.halo = halo;
        Ok(())
    }

    /// Copy the CSR structure and permutation into the host mirror.
    pub fn copy_problem_to_host(&mut self, device: &D) -> Result<()> {
        let matrix = self
            .matrix
            .as_ref()
            .ok_or_else(|| MgError::Setup("level has no device structure".into()))?;
        let perm = self
            .perm
            .as_ref()
            .ok_or_else(|| MgError::Setup("level has no row permutation".into()))?;

        let row_pointers = device.download_indices(&matrix.row_pointers)?;
        let host_matrix = CsrMatrix {
            nrows: self.local_rows,
            ncols: self.local_cols,
            values: device.download_values(&matrix.values)?,
            col_indices: device.download_indices(&matrix.col_indices)?,
            row_pointers: row_pointers.into_iter().map(|p| p as usize).collect(),
        };
        self.host.matrix = Some(host_matrix);
        self.host.perm = Some(device.download_indices(perm)?);
        Ok(())
    }

    /// Copy the halo send list into the host mirror.
    pub fn copy_halo_to_host(&mut self, device: &D) -> Result<()> {
        let send = self
            .elements_to_send
            .as_ref()
            .ok_or_else(|| MgError::Setup("level has no halo metadata".into()))?;
        debug_assert_eq!(send.len(), self.halo.total_to_send);
        self.host.elements_to_send = Some(device.download_indices(send)?);
        Ok(())
    }

    /// Attach the next coarser level. A level accepts exactly one coarse level.
    pub fn attach_coarse(&mut self, coarse: CoarseLevel<D>) -> Result<&mut SparseLevel<D>> {
        if self.coarse.is_some() {
            return Err(MgError::Setup(
                "a coarse level is already attached to this level".into(),
            ));
        }
        if coarse.mg_data.c2f_len() != self.geom.local_points() as usize {
            return Err(MgError::Setup(format!(
                "transfer data covers {} fine points, level has {}",
                coarse.mg_data.c2f_len(),
                self.geom.local_points()
            )));
        }
        let link = self.coarse.insert(Box::new(coarse));
        Ok(&mut link.level)
    }

    pub fn coarse(&self) -> Option<&SparseLevel<D>> {
        self.coarse.as_deref().map(|c| &c.level)
    }

    pub fn coarse_mut(&mut self) -> Option<&mut SparseLevel<D>> {
        self.coarse.as_deref_mut().map(|c| &mut c.level)
    }

    pub fn mg_data(&self) -> Option<&MgData<D>> {
        self.coarse.as_deref().map(|c| &c.mg_data)
    }

    pub fn mg_data_mut(&mut self) -> Option<&mut MgData<D>> {
        self.coarse.as_deref_mut().map(|c| &mut c.mg_data)
    }

    /// The coarse link as a whole, for callers that need both halves at once.
    pub fn coarse_link_mut(&mut self) -> Option<&mut CoarseLevel<D>> {
        self.coarse.as_deref_mut()
    }

    /// This level followed by every coarser level, finest first.
    pub fn levels(&self) -> impl Iterator<Item = &SparseLevel<D>> {
        std::iter::successors(Some(self), |level| level.coarse())
    }

    /// Number of levels in the chain starting here.
    pub fn depth(&self) -> usize {
        self.levels().count()
    }
}
