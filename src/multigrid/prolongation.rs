//! Coarse-to-fine correction.

use crate::device::Device;
use crate::error::{MgError, Result};
use crate::level::SparseLevel;
use crate::vector::Vector;

/// Add the coarse correction held in `af`'s transfer data into `xf`:
/// `xf[perm_fine[f2c[i]]] += xc[perm_coarse[i]]` for every coarse row `i`.
///
/// Values are accumulated, never overwritten.
pub fn compute_prolongation<D: Device>(
    device: &D,
    af: &SparseLevel<D>,
    xf: &mut Vector<D>,
) -> Result<()> {
    let (ac, mg) = af
        .coarse()
        .zip(af.mg_data())
        .ok_or_else(|| MgError::Precondition("no coarse level attached".into()))?;
    let perm_fine = af
        .perm()
        .ok_or_else(|| MgError::Precondition("fine level has no row permutation".into()))?;
    let perm_coarse = ac
        .perm()
        .ok_or_else(|| MgError::Precondition("coarse level has no row permutation".into()))?;
    let xc = mg
        .xc()
        .device_values()
        .ok_or_else(|| MgError::Precondition("coarse correction is not on the device".into()))?;
    if xf.len() < af.local_rows() {
        return Err(MgError::Precondition(format!(
            "fine vector of length {} for {} fine rows",
            xf.len(),
            af.local_rows()
        )));
    }
    let fine = xf
        .device_values_mut()
        .ok_or_else(|| MgError::Precondition("fine vector is not on the device".into()))?;

    let n_coarse = mg.coarse_rows();
    tracing::debug!(n_coarse, fine_rows = af.local_rows(), "prolongation");
    // SAFETY: `MgData` is only built from the f2c-operator kernel's output,
    // which maps coarse rows to pairwise distinct fine rows, and `perm_fine`
    // was checked to be a bijection when the fine level was assembled.
    unsafe { device.launch_prolongation(n_coarse, mg.f2c(), xc, fine, perm_fine, perm_coarse) }
}
