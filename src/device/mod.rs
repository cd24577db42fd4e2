//! Compute device abstraction for level storage and transfer kernels.
//!
//! Defines the `Device` trait over which hierarchy construction and the
//! prolongation kernel run, with a rayon-parallel host implementation and a
//! wgpu compute implementation.

mod gpu;
mod gpu_shaders;
mod host;

pub use gpu::{WgpuBuffer, WgpuDevice};
pub use host::HostDevice;

use crate::error::Result;
use crate::LocalInt;

/// Buffers expose their element count.
pub trait DeviceBuffer {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> DeviceBuffer for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Launch and transfer counters, reported by `--stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub allocations: u32,
    pub bytes_allocated: u64,
    pub launches: u32,
    pub readbacks: u32,
}

/// Fine and coarse local grid extents for one coarsening step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferGrid {
    pub coarse: [LocalInt; 3],
    pub fine: [LocalInt; 3],
}

impl TransferGrid {
    pub fn coarse_rows(&self) -> usize {
        self.coarse.iter().map(|&n| n as usize).product()
    }

    pub fn fine_points(&self) -> usize {
        self.fine.iter().map(|&n| n as usize).product()
    }

    /// Linear row index of coarse cell (x, y, z), z-major.
    pub fn coarse_row(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.coarse;
        z * nx as usize * ny as usize + y * nx as usize + x
    }

    /// Linear row index of the fine cell injected into coarse cell (x, y, z).
    pub fn fine_row(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.fine;
        2 * z * nx as usize * ny as usize + 2 * y * nx as usize + 2 * x
    }

    /// Whether every fine extent is exactly twice the coarse one.
    pub fn is_consistent(&self) -> bool {
        self.fine
            .iter()
            .zip(&self.coarse)
            .all(|(&f, &c)| f as u64 == 2 * c as u64)
    }
}

/// Execution backend for level storage and the transfer kernels.
///
/// Kernel launches may be asynchronous. Launches issued through one device
/// execute in program order; any host read goes through a `download_*` call or
/// `synchronize`, which wait for outstanding work.
pub trait Device {
    /// Storage for vector and matrix values.
    type Values: DeviceBuffer;
    /// Storage for index arrays (mappings, permutations, CSR structure).
    type Indices: DeviceBuffer;

    fn name(&self) -> &'static str;

    /// Allocate `n` zero-initialized values.
    fn alloc_values(&self, n: usize) -> Result<Self::Values>;

    /// Allocate `n` zero-initialized indices.
    fn alloc_indices(&self, n: usize) -> Result<Self::Indices>;

    fn upload_values(&self, data: &[f64]) -> Result<Self::Values>;

    fn upload_indices(&self, data: &[LocalInt]) -> Result<Self::Indices>;

    /// Overwrite an existing buffer; `data` must match its length.
    fn write_values(&self, data: &[f64], dst: &mut Self::Values) -> Result<()>;

    fn download_values(&self, src: &Self::Values) -> Result<Vec<f64>>;

    fn download_indices(&self, src: &Self::Indices) -> Result<Vec<LocalInt>>;

    /// Set every element of `buf` to `value`.
    fn fill_indices(&self, buf: &mut Self::Indices, value: LocalInt) -> Result<()>;

    /// Fill the fine→coarse and coarse→fine injection arrays.
    ///
    /// One unit of work per coarse cell writes `f2c[coarse] = fine` and
    /// `c2f[fine] = coarse`. Entries of `c2f` not hit by any coarse cell are
    /// left untouched.
    fn launch_f2c_operator(
        &self,
        grid: &TransferGrid,
        f2c: &mut Self::Indices,
        c2f: &mut Self::Indices,
    ) -> Result<()>;

    /// `fine[perm_fine[f2c[i]]] += coarse[perm_coarse[i]]` for `i < n_coarse`.
    ///
    /// # Safety
    ///
    /// Units of work run concurrently without atomics. `f2c[..n_coarse]` must
    /// hold pairwise distinct values and `perm_fine` must be injective on them,
    /// so that no two units write the same element of `fine`.
    unsafe fn launch_prolongation(
        &self,
        n_coarse: usize,
        f2c: &Self::Indices,
        coarse: &Self::Values,
        fine: &mut Self::Values,
        perm_fine: &Self::Indices,
        perm_coarse: &Self::Indices,
    ) -> Result<()>;

    /// Block until all launched work has completed.
    fn synchronize(&self) -> Result<()>;

    fn counters(&self) -> DeviceCounters;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_grid_row_indices() {
        let grid = TransferGrid {
            coarse: [4, 4, 4],
            fine: [8, 8, 8],
        };
        assert_eq!(grid.coarse_rows(), 64);
        assert_eq!(grid.fine_points(), 512);
        assert_eq!(grid.coarse_row(1, 2, 3), 3 * 16 + 2 * 4 + 1);
        assert_eq!(grid.fine_row(1, 2, 3), 6 * 64 + 4 * 8 + 2);
        assert!(grid.is_consistent());
    }

    #[test]
    fn transfer_grid_detects_inconsistent_extents() {
        let grid = TransferGrid {
            coarse: [4, 4, 4],
            fine: [8, 9, 8],
        };
        assert!(!grid.is_consistent());
    }
}
