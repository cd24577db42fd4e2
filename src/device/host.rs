//! Host device: buffers live in process memory, kernels run on rayon.

use std::cell::Cell;

use rayon::prelude::*;

use crate::error::{MgError, Result};
use crate::LocalInt;

use super::{Device, DeviceCounters, TransferGrid};

/// Raw output pointer shared by units of work that write disjoint elements.
struct UnsafeMut<T>(*mut T);

impl<T> UnsafeMut<T> {
    /// # Safety
    ///
    /// Returns a raw mutable pointer; callers guarantee disjoint access.
    unsafe fn get(&self) -> *mut T {
        self.0
    }
}

unsafe impl<T> Send for UnsafeMut<T> {}
unsafe impl<T> Sync for UnsafeMut<T> {}

fn try_alloc<T: Copy>(n: usize, fill: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n).map_err(|e| {
        MgError::Resource(format!("host allocation of {n} elements failed: {e}"))
    })?;
    v.resize(n, fill);
    Ok(v)
}

fn rejected(kernel: &str, reason: String) -> MgError {
    MgError::Resource(format!("{kernel} launch rejected: {reason}"))
}

/// Rayon-parallel host device.
///
/// Every kernel launch completes before returning, so `synchronize` is a no-op.
#[derive(Default)]
pub struct HostDevice {
    allocations: Cell<u32>,
    bytes_allocated: Cell<u64>,
    launches: Cell<u32>,
    readbacks: Cell<u32>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_alloc<T>(&self, n: usize) {
        self.allocations.set(self.allocations.get() + 1);
        self.bytes_allocated
            .set(self.bytes_allocated.get() + (n * std::mem::size_of::<T>()) as u64);
    }

    fn record_launch(&self) {
        self.launches.set(self.launches.get() + 1);
    }

    fn record_readback(&self) {
        self.readbacks.set(self.readbacks.get() + 1);
    }
}

impl Device for HostDevice {
    type Values = Vec<f64>;
    type Indices = Vec<LocalInt>;

    fn name(&self) -> &'static str {
        "host"
    }

    fn alloc_values(&self, n: usize) -> Result<Vec<f64>> {
        let v = try_alloc(n, 0.0)?;
        self.record_alloc::<f64>(n);
        Ok(v)
    }

    fn alloc_indices(&self, n: usize) -> Result<Vec<LocalInt>> {
        let v = try_alloc(n, 0)?;
        self.record_alloc::<LocalInt>(n);
        Ok(v)
    }

    fn upload_values(&self, data: &[f64]) -> Result<Vec<f64>> {
        let mut v = self.alloc_values(data.len())?;
        v.copy_from_slice(data);
        Ok(v)
    }

    fn upload_indices(&self, data: &[LocalInt]) -> Result<Vec<LocalInt>> {
        let mut v = self.alloc_indices(data.len())?;
        v.copy_from_slice(data);
        Ok(v)
    }

    fn write_values(&self, data: &[f64], dst: &mut Vec<f64>) -> Result<()> {
        if data.len() != dst.len() {
            return Err(MgError::Resource(format!(
                "write of {} values into a buffer of {}",
                data.len(),
                dst.len()
            )));
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    fn download_values(&self, src: &Vec<f64>) -> Result<Vec<f64>> {
        self.record_readback();
        Ok(src.clone())
    }

    fn download_indices(&self, src: &Vec<LocalInt>) -> Result<Vec<LocalInt>> {
        self.record_readback();
        Ok(src.clone())
    }

    fn fill_indices(&self, buf: &mut Vec<LocalInt>, value: LocalInt) -> Result<()> {
        self.record_launch();
        buf.par_iter_mut().for_each(|v| *v = value);
        Ok(())
    }

    fn launch_f2c_operator(
        &self,
        grid: &TransferGrid,
        f2c: &mut Vec<LocalInt>,
        c2f: &mut Vec<LocalInt>,
    ) -> Result<()> {
        let kernel = "f2c_operator";
        if !grid.is_consistent() || grid.coarse_rows() == 0 {
            return Err(rejected(kernel, format!("invalid transfer grid {grid:?}")));
        }
        if LocalInt::try_from(grid.fine_points()).is_err() {
            return Err(rejected(
                kernel,
                format!("{} fine points exceed the index type", grid.fine_points()),
            ));
        }
        if f2c.len() != grid.coarse_rows() || c2f.len() != grid.fine_points() {
            return Err(rejected(
                kernel,
                format!(
                    "buffers of {}/{} for {} coarse rows and {} fine points",
                    f2c.len(),
                    c2f.len(),
                    grid.coarse_rows(),
                    grid.fine_points()
                ),
            ));
        }
        self.record_launch();

        let [nxc, nyc, _] = grid.coarse.map(|n| n as usize);
        let [nxf, nyf, _] = grid.fine.map(|n| n as usize);
        let coarse_plane = nxc * nyc;
        let fine_plane_pair = 2 * nxf * nyf;

        // Each task owns one coarse z-plane of f2c and the two fine z-planes of
        // c2f it injects into; no element is reachable from two tasks.
        f2c.par_chunks_mut(coarse_plane)
            .zip(c2f.par_chunks_mut(fine_plane_pair))
            .enumerate()
            .for_each(|(izc, (f2c_plane, c2f_planes))| {
                for iyc in 0..nyc {
                    for ixc in 0..nxc {
                        let coarse_row = grid.coarse_row(ixc, iyc, izc);
                        let fine_row = grid.fine_row(ixc, iyc, izc);
                        f2c_plane[iyc * nxc + ixc] = fine_row as LocalInt;
                        c2f_planes[2 * iyc * nxf + 2 * ixc] = coarse_row as LocalInt;
                    }
                }
            });
        Ok(())
    }

    unsafe fn launch_prolongation(
        &self,
        n_coarse: usize,
        f2c: &Vec<LocalInt>,
        coarse: &Vec<f64>,
        fine: &mut Vec<f64>,
        perm_fine: &Vec<LocalInt>,
        perm_coarse: &Vec<LocalInt>,
    ) -> Result<()> {
        let kernel = "prolongation";
        if f2c.len() < n_coarse || perm_coarse.len() < n_coarse {
            return Err(rejected(
                kernel,
                format!(
                    "{n_coarse} coarse rows but f2c has {} and the coarse permutation {}",
                    f2c.len(),
                    perm_coarse.len()
                ),
            ));
        }
        let fine_len = fine.len();
        let source = |i: usize| {
            perm_coarse
                .get(i)
                .map(|&p| p as usize)
                .filter(|&p| p < coarse.len())
                .ok_or_else(|| rejected(kernel, format!("coarse row {i} out of range")))
        };
        let target = |i: usize| {
            perm_fine
                .get(f2c[i] as usize)
                .map(|&p| p as usize)
                .filter(|&p| p < fine_len)
                .ok_or_else(|| rejected(kernel, format!("fine row {} out of range", f2c[i])))
        };
        // Bounds are checked for every unit before any unit writes, so a
        // rejected launch leaves `fine` untouched.
        (0..n_coarse)
            .into_par_iter()
            .try_for_each(|i| source(i).and(target(i)).map(drop))?;
        self.record_launch();

        let out = UnsafeMut(fine.as_mut_ptr());
        (0..n_coarse).into_par_iter().for_each(|i| {
            if let (Ok(src), Ok(dst)) = (source(i), target(i)) {
                // SAFETY: dst < fine_len, and the caller guarantees no other
                // unit of this launch targets dst.
                unsafe {
                    *out.get().add(dst) += coarse[src];
                }
            }
        });
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    fn counters(&self) -> DeviceCounters {
        DeviceCounters {
            allocations: self.allocations.get(),
            bytes_allocated: self.bytes_allocated.get(),
            launches: self.launches.get(),
            readbacks: self.readbacks.get(),
        }
    }
}
