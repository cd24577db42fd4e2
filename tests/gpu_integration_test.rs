//! Integration tests comparing the wgpu device with the host device.
//!
//! Note: the wgpu device stores values as f32, so value comparisons use an
//! absolute tolerance. Index arrays are u32 on both devices and must match
//! exactly.

use approx::assert_abs_diff_eq;
use hpcg_mg::{
    compute_prolongation, copy_coarse_problem_to_host, CoarseProblemBuilder, Device,
    GeometryGenerator, HostDevice, MgConfig, Ordering, SparseLevel, StructuredGeometry, Vector,
    WgpuDevice, UNMAPPED,
};

fn gpu_available() -> bool {
    WgpuDevice::new().is_ok()
}

macro_rules! skip_if_no_gpu {
    () => {
        if !gpu_available() {
            eprintln!("Skipping: no GPU available");
            return;
        }
    };
}

/// Helper: two-level hierarchy on an n^3 single-rank grid.
fn two_levels<D: Device>(dev: &D, n: u32, ordering: Ordering) -> SparseLevel<D> {
    let geom = StructuredGeometry
        .build(1, 0, 1, 0, 0, 0, n, n, n, 1, 1, 1)
        .expect("geometry failed");
    let config = MgConfig::default()
        .with_levels(2)
        .with_ordering(ordering)
        .with_reference_check(true);
    let builder = CoarseProblemBuilder::new(dev, config);
    let mut fine = builder.generate_fine_level(geom).expect("fine level failed");
    builder.build_hierarchy(&mut fine).expect("hierarchy failed");
    fine
}

/// Helper: prolongate a ramp correction into a constant fine vector.
fn prolongate_ramp<D: Device>(dev: &D, fine: &mut SparseLevel<D>) -> Vec<f64> {
    let mg = fine.mg_data_mut().unwrap();
    let n = mg.xc().len();
    let ramp: Vec<f64> = (0..n).map(|i| 0.5 + i as f64).collect();
    mg.xc_mut().upload(dev, &ramp).unwrap();

    let cols = fine.local_cols();
    let mut xf = Vector::from_host(dev, &vec![1.0; cols]).unwrap();
    compute_prolongation(dev, fine, &mut xf).unwrap();
    xf.to_vec(dev).unwrap()
}

#[test]
fn gpu_mapping_matches_host() {
    skip_if_no_gpu!();
    let gpu = WgpuDevice::new().unwrap();
    let host = HostDevice::new();

    let g = two_levels(&gpu, 8, Ordering::Natural);
    let h = two_levels(&host, 8, Ordering::Natural);

    let (gm, hm) = (g.mg_data().unwrap(), h.mg_data().unwrap());
    let g_f2c = gpu.download_indices(gm.f2c()).unwrap();
    let g_c2f = gpu.download_indices(gm.c2f()).unwrap();
    assert_eq!(&g_f2c, hm.f2c());
    assert_eq!(&g_c2f, hm.c2f());
    assert_eq!(g_c2f.iter().filter(|&&c| c != UNMAPPED).count(), 64);
}

#[test]
fn gpu_prolongation_matches_host() {
    skip_if_no_gpu!();
    for ordering in [Ordering::Natural, Ordering::Multicolor] {
        let gpu = WgpuDevice::new().unwrap();
        let host = HostDevice::new();
        let mut g = two_levels(&gpu, 8, ordering);
        let mut h = two_levels(&host, 8, ordering);

        let gv = prolongate_ramp(&gpu, &mut g);
        let hv = prolongate_ramp(&host, &mut h);
        assert_eq!(gv.len(), hv.len());
        for (a, b) in gv.iter().zip(&hv) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }
}

#[test]
fn gpu_host_mirror_matches_host_device() {
    skip_if_no_gpu!();
    let gpu = WgpuDevice::new().unwrap();
    let host = HostDevice::new();
    let mut g = two_levels(&gpu, 8, Ordering::Multicolor);
    let mut h = two_levels(&host, 8, Ordering::Multicolor);
    copy_coarse_problem_to_host(&gpu, &mut g).unwrap();
    copy_coarse_problem_to_host(&host, &mut h).unwrap();

    let (gc, hc) = (g.coarse().unwrap().host(), h.coarse().unwrap().host());
    assert_eq!(gc.perm, hc.perm);
    assert_eq!(gc.elements_to_send, hc.elements_to_send);
    let (gmat, hmat) = (gc.matrix.as_ref().unwrap(), hc.matrix.as_ref().unwrap());
    assert_eq!(gmat.row_pointers, hmat.row_pointers);
    assert_eq!(gmat.col_indices, hmat.col_indices);
    for (a, b) in gmat.values.iter().zip(&hmat.values) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }

    let (gm, hm) = (g.mg_data().unwrap(), h.mg_data().unwrap());
    assert_eq!(gm.host_f2c(), hm.host_f2c());
    assert_eq!(
        gm.axf().host_values().map(<[f64]>::len),
        hm.axf().host_values().map(<[f64]>::len)
    );
}
