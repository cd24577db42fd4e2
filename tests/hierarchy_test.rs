//! End-to-end hierarchy tests on the host device.

use approx::assert_abs_diff_eq;
use hpcg_mg::output::{self, LevelSummary};
use hpcg_mg::{
    compute_prolongation, copy_coarse_problem_to_host, CoarseProblemBuilder, Device,
    GeometryGenerator, HostDevice, MgConfig, MgError, Ordering, SparseLevel, StructuredGeometry,
    Vector, UNMAPPED,
};

/// Helper: single-rank fine level plus a hierarchy of `levels` levels.
fn build(dev: &HostDevice, n: u32, levels: usize, ordering: Ordering) -> SparseLevel<HostDevice> {
    let geom = StructuredGeometry
        .build(1, 0, 1, 0, 0, 0, n, n, n, 1, 1, 1)
        .expect("geometry failed");
    let config = MgConfig::default()
        .with_levels(levels)
        .with_ordering(ordering);
    let builder = CoarseProblemBuilder::new(dev, config);
    let mut fine = builder.generate_fine_level(geom).expect("fine level failed");
    builder.build_hierarchy(&mut fine).expect("hierarchy failed");
    fine
}

#[test]
fn every_level_satisfies_the_mapping_invariants() {
    let dev = HostDevice::new();
    let fine = build(&dev, 16, 4, Ordering::Natural);
    assert_eq!(fine.depth(), 4);

    for level in fine.levels() {
        let Some(mg) = level.mg_data() else {
            assert!(level.coarse().is_none());
            continue;
        };
        let coarse = level.coarse().unwrap();
        assert_eq!(mg.coarse_rows(), coarse.local_rows());
        assert_eq!(mg.c2f_len(), level.local_rows());

        let (f2c, c2f) = (mg.f2c(), mg.c2f());
        for (i, &f) in f2c.iter().enumerate() {
            assert_eq!(c2f[f as usize] as usize, i);
        }
        let mapped = c2f.iter().filter(|&&c| c != UNMAPPED).count();
        assert_eq!(mapped, f2c.len());
    }
}

#[test]
fn level_sizes_shrink_by_eight() {
    let dev = HostDevice::new();
    let fine = build(&dev, 16, 4, Ordering::Natural);
    let rows: Vec<usize> = fine.levels().map(SparseLevel::local_rows).collect();
    assert_eq!(rows, vec![4096, 512, 64, 8]);
    // 27-point stencil on an n^3 box has (3n - 2)^3 nonzeros.
    let nnz: Vec<usize> = fine.levels().map(SparseLevel::nnz).collect();
    assert_eq!(nnz, vec![97336, 10648, 1000, 64]);
}

#[test]
fn stencil_rows_sum_to_zero_on_interior() {
    let dev = HostDevice::new();
    let mut fine = build(&dev, 8, 2, Ordering::Natural);
    copy_coarse_problem_to_host(&dev, &mut fine).unwrap();
    let matrix = fine.coarse().unwrap().host().matrix.clone().unwrap();
    // Constant vectors are annihilated on interior rows; boundary rows keep a
    // positive surplus.
    let y = matrix.spmv(&vec![1.0; matrix.ncols]);
    let interior = 16 + 4 + 1;
    assert_abs_diff_eq!(y[interior], 0.0);
    assert!(y[0] > 0.0);
}

#[test]
fn prolongation_of_ones_hits_each_injected_point_once() {
    for ordering in [Ordering::Natural, Ordering::Multicolor] {
        let dev = HostDevice::new();
        let mut fine = build(&dev, 8, 2, ordering);
        let mg = fine.mg_data_mut().unwrap();
        let n = mg.xc().len();
        mg.xc_mut().upload(&dev, &vec![1.0; n]).unwrap();

        let mut xf = Vector::on_device(&dev, fine.local_cols()).unwrap();
        compute_prolongation(&dev, &fine, &mut xf).unwrap();
        let values = xf.to_vec(&dev).unwrap();

        let ones = values.iter().filter(|&&v| v == 1.0).count();
        let zeros = values.iter().filter(|&&v| v == 0.0).count();
        assert_eq!(ones, 64, "{ordering:?}");
        assert_eq!(zeros, 512 - 64, "{ordering:?}");
    }
}

#[test]
fn odd_fine_grid_fails_without_allocating() {
    let dev = HostDevice::new();
    let geom = StructuredGeometry
        .build(1, 0, 1, 0, 0, 0, 7, 8, 8, 1, 1, 1)
        .unwrap();
    let builder = CoarseProblemBuilder::new(&dev, MgConfig::default());
    let mut fine = builder.generate_fine_level(geom).unwrap();
    let before = dev.counters();

    let result = builder.build_hierarchy(&mut fine);
    assert!(matches!(result, Err(MgError::Precondition(_))));
    assert_eq!(dev.counters().allocations, before.allocations);
    assert!(fine.coarse().is_none());
}

#[test]
fn rebuilding_gives_identical_hierarchies() {
    let dev = HostDevice::new();
    let a = build(&dev, 8, 3, Ordering::Multicolor);
    let b = build(&dev, 8, 3, Ordering::Multicolor);
    for (la, lb) in a.levels().zip(b.levels()) {
        assert_eq!(la.perm(), lb.perm());
        match (la.mg_data(), lb.mg_data()) {
            (Some(ma), Some(mb)) => {
                assert_eq!(ma.f2c(), mb.f2c());
                assert_eq!(ma.c2f(), mb.c2f());
            }
            (None, None) => {}
            _ => panic!("hierarchies differ in depth"),
        }
    }
}

#[test]
fn two_rank_decomposition_builds_consistent_halos() {
    let dev = HostDevice::new();
    let builder = CoarseProblemBuilder::new(&dev, MgConfig::default().with_levels(3));
    for rank in 0..2 {
        let geom = StructuredGeometry
            .build(2, rank, 1, 0, 0, 0, 8, 8, 8, 2, 1, 1)
            .unwrap();
        let mut fine = builder.generate_fine_level(geom).unwrap();
        builder.build_hierarchy(&mut fine).unwrap();

        let faces: Vec<usize> = fine.levels().map(|l| l.halo().num_external).collect();
        assert_eq!(faces, vec![64, 16, 4]);
        for level in fine.levels() {
            let halo = level.halo();
            assert_eq!(halo.neighbors, vec![1 - rank]);
            assert_eq!(halo.total_to_send, halo.num_external);
            assert_eq!(level.local_cols(), level.local_rows() + halo.num_external);
        }
    }
}

#[test]
fn summary_csv_matches_the_hierarchy() {
    let dev = HostDevice::new();
    let fine = build(&dev, 8, 3, Ordering::Natural);
    let summaries: Vec<LevelSummary> = fine
        .levels()
        .enumerate()
        .map(|(i, l)| LevelSummary::new(i, l, l.mg_data().map_or(0, |m| m.coarse_rows())))
        .collect();
    let mut out = Vec::new();
    output::write_hierarchy_csv(&summaries, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "level,nx,ny,nz,rows,cols,nnz,prolongated",
            "0,8,8,8,512,512,10648,64",
            "1,4,4,4,64,64,1000,8",
            "2,2,2,2,8,8,64,0",
        ]
    );
}
