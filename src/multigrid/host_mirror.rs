//! Host mirrors of device-resident coarse levels.

use crate::device::Device;
use crate::error::{MgError, Result};
use crate::level::SparseLevel;
use crate::vector::Vector;

/// Give `v` a host form equal to its device form, or zeros if it has none.
fn mirror_vector<D: Device>(device: &D, v: &mut Vector<D>) -> Result<()> {
    if v.is_on_device() {
        v.copy_to_host(device)?;
    } else {
        v.init_host();
    }
    Ok(())
}

/// Populate the host mirror of the coarse level attached to `af` and of its
/// transfer data.
///
/// Waits for outstanding device work first. Nothing is recomputed; device
/// state is left untouched.
pub fn copy_coarse_problem_to_host<D: Device>(device: &D, af: &mut SparseLevel<D>) -> Result<()> {
    let link = af
        .coarse_link_mut()
        .ok_or_else(|| MgError::Precondition("no coarse level attached".into()))?;
    let rows = link.level.local_rows();
    let _span = tracing::debug_span!("copy_coarse_problem_to_host", rows).entered();

    device.synchronize()?;
    link.level.copy_problem_to_host(device)?;
    link.level.copy_halo_to_host(device)?;

    let (rc, xc, axf) = link.mg_data.vectors_mut();
    mirror_vector(device, rc)?;
    mirror_vector(device, xc)?;
    mirror_vector(device, axf)?;

    let f2c = device.download_indices(link.mg_data.f2c())?;
    link.mg_data.set_host_f2c(f2c);
    Ok(())
}

/// Mirror every coarse level below `finest`. Returns the number mirrored.
pub fn copy_hierarchy_to_host<D: Device>(device: &D, finest: &mut SparseLevel<D>) -> Result<usize> {
    let mut mirrored = 0;
    let mut level = Some(finest);
    while let Some(current) = level {
        if current.coarse().is_none() {
            break;
        }
        copy_coarse_problem_to_host(device, current)?;
        mirrored += 1;
        level = current.coarse_mut();
    }
    Ok(mirrored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MgConfig;
    use crate::device::HostDevice;
    use crate::geometry::{GeometryGenerator, StructuredGeometry};
    use crate::multigrid::CoarseProblemBuilder;

    fn hierarchy(dev: &HostDevice, levels: usize, reference: bool) -> SparseLevel<HostDevice> {
        let geom = StructuredGeometry
            .build(1, 0, 1, 0, 0, 0, 8, 8, 8, 1, 1, 1)
            .unwrap();
        let config = MgConfig::default()
            .with_levels(levels)
            .with_reference_check(reference);
        let builder = CoarseProblemBuilder::new(dev, config);
        let mut fine = builder.generate_fine_level(geom).unwrap();
        builder.build_hierarchy(&mut fine).unwrap();
        fine
    }

    #[test]
    fn mirror_matches_device_contents() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 2, true);
        let fine_cols = fine.local_cols();
        copy_coarse_problem_to_host(&dev, &mut fine).unwrap();

        let coarse = fine.coarse().unwrap();
        let host = coarse.host();
        let matrix = host.matrix.as_ref().unwrap();
        let device = coarse.matrix().unwrap();
        assert_eq!(matrix.values, device.values);
        assert_eq!(matrix.col_indices, device.col_indices);
        assert_eq!(matrix.nnz(), coarse.nnz());
        assert_eq!(host.perm.as_ref(), coarse.perm());
        assert_eq!(host.elements_to_send.as_ref().map(Vec::len), Some(0));

        let mg = fine.mg_data().unwrap();
        assert_eq!(mg.host_f2c(), Some(mg.f2c().as_slice()));
        assert_eq!(mg.rc().host_values().map(<[f64]>::len), Some(64));
        assert_eq!(mg.xc().host_values().map(<[f64]>::len), Some(coarse.local_cols()));
        assert_eq!(mg.axf().host_values().map(<[f64]>::len), Some(fine_cols));
    }

    #[test]
    fn mirror_carries_work_vector_values() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 2, true);
        let fine_cols = fine.local_cols();
        let mg = fine.mg_data_mut().unwrap();
        let rc: Vec<f64> = (0..64).map(f64::from).collect();
        let axf = vec![-1.5; fine_cols];
        mg.rc_mut().upload(&dev, &rc).unwrap();
        mg.axf_mut().upload(&dev, &axf).unwrap();

        copy_coarse_problem_to_host(&dev, &mut fine).unwrap();
        let mg = fine.mg_data().unwrap();
        assert_eq!(mg.rc().host_values(), Some(rc.as_slice()));
        assert_eq!(mg.axf().host_values(), Some(axf.as_slice()));
    }

    #[test]
    fn deferred_residual_gets_a_zero_host_form() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 2, false);
        copy_coarse_problem_to_host(&dev, &mut fine).unwrap();
        let axf = fine.mg_data().unwrap().axf();
        assert!(!axf.is_on_device());
        let host = axf.host_values().unwrap();
        assert_eq!(host.len(), 512);
        assert!(host.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn mirroring_does_not_allocate_device_memory() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 2, false);
        let before = dev.counters();
        copy_coarse_problem_to_host(&dev, &mut fine).unwrap();
        let after = dev.counters();
        assert_eq!(after.allocations, before.allocations);
        assert!(after.readbacks > before.readbacks);
    }

    #[test]
    fn whole_hierarchy_is_mirrored() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 3, false);
        assert_eq!(copy_hierarchy_to_host(&dev, &mut fine).unwrap(), 2);
        assert!(fine.host().matrix.is_none());
        for level in fine.levels().skip(1) {
            assert!(level.host().matrix.is_some());
            assert_eq!(level.host().perm.as_ref().map(|p| p.len()), Some(level.local_rows()));
        }
        let last_f2c = fine.coarse().unwrap().mg_data().unwrap().host_f2c();
        assert_eq!(last_f2c.map(|f| f.len()), Some(8));
    }

    #[test]
    fn without_coarse_level_fails() {
        let dev = HostDevice::new();
        let mut fine = hierarchy(&dev, 1, false);
        assert!(matches!(
            copy_coarse_problem_to_host(&dev, &mut fine),
            Err(MgError::Precondition(_))
        ));
        assert!(fine.mg_data().is_none());
    }
}
