//! 27-point stencil problem assembler.

use rayon::prelude::*;

use crate::config::Ordering;
use crate::device::Device;
use crate::error::{MgError, Result};
use crate::level::SparseLevel;
use crate::sparse::CsrMatrix;
use crate::{GlobalInt, LocalInt};

use super::ProblemAssembler;

const DIAGONAL: f64 = 26.0;
const OFF_DIAGONAL: f64 = -1.0;
const STENCIL_POINTS: usize = 27;

/// Assembles the benchmark operator: every grid point couples to its up to
/// 26 neighbors with -1 and to itself with 26.
#[derive(Debug, Clone, Copy, Default)]
pub struct StencilAssembler {
    pub ordering: Ordering,
}

impl StencilAssembler {
    pub fn new(ordering: Ordering) -> Self {
        Self { ordering }
    }
}

impl ProblemAssembler for StencilAssembler {
    fn populate<D: Device>(&self, device: &D, level: &mut SparseLevel<D>) -> Result<()> {
        let geom = level.geometry();
        let local_rows = geom.local_points();
        if local_rows == 0 || LocalInt::try_from(local_rows).is_err() {
            return Err(MgError::Precondition(format!(
                "{local_rows} local rows do not fit the local index type"
            )));
        }
        let (nx, ny, nz) = (geom.nx as usize, geom.ny as usize, geom.nz as usize);
        let (gnx, gny, gnz) = (geom.gnx as i64, geom.gny as i64, geom.gnz as i64);
        let (gix0, giy0, giz0) = (geom.gix0 as i64, geom.giy0 as i64, geom.giz0 as i64);

        let _span = tracing::debug_span!("stencil_assembly", nx, ny, nz).entered();

        // Rows of one z-plane are independent of every other plane.
        let planes: Vec<(Vec<GlobalInt>, Vec<f64>, Vec<usize>)> = (0..nz)
            .into_par_iter()
            .map(|iz| {
                let mut cols = Vec::with_capacity(nx * ny * STENCIL_POINTS);
                let mut vals = Vec::with_capacity(nx * ny * STENCIL_POINTS);
                let mut counts = Vec::with_capacity(nx * ny);
                let giz = giz0 + iz as i64;
                for iy in 0..ny {
                    let giy = giy0 + iy as i64;
                    for ix in 0..nx {
                        let gix = gix0 + ix as i64;
                        let before = cols.len();
                        for sz in -1..=1 {
                            let z = giz + sz;
                            if z < 0 || z >= gnz {
                                continue;
                            }
                            for sy in -1..=1 {
                                let y = giy + sy;
                                if y < 0 || y >= gny {
                                    continue;
                                }
                                for sx in -1..=1 {
                                    let x = gix + sx;
                                    if x < 0 || x >= gnx {
                                        continue;
                                    }
                                    let col = (z * gnx * gny + y * gnx + x) as GlobalInt;
                                    let diag = sx == 0 && sy == 0 && sz == 0;
                                    cols.push(col);
                                    vals.push(if diag { DIAGONAL } else { OFF_DIAGONAL });
                                }
                            }
                        }
                        counts.push(cols.len() - before);
                    }
                }
                (cols, vals, counts)
            })
            .collect();

        let total_nnz: usize = planes.iter().map(|(c, _, _)| c.len()).sum();
        let mut rows: CsrMatrix<GlobalInt> =
            CsrMatrix::with_capacity(geom.global_points() as usize, local_rows as usize, total_nnz);
        for (cols, vals, counts) in &planes {
            let mut start = 0;
            for &count in counts {
                rows.push_row(&cols[start..start + count], &vals[start..start + count]);
                start += count;
            }
        }

        let perm = match self.ordering {
            Ordering::Natural => (0..local_rows as LocalInt).collect(),
            Ordering::Multicolor => multicolor_permutation(nx, ny, nz),
        };

        tracing::debug!(rows = rows.nrows, nnz = rows.nnz(), "stencil assembled");
        level.set_problem(device, rows, &perm)
    }
}

/// Permutation grouping rows into 8 colors by coordinate parity.
///
/// Rows of one color keep their natural relative order.
fn multicolor_permutation(nx: usize, ny: usize, nz: usize) -> Vec<LocalInt> {
    let color = |row: usize| {
        let ix = row % nx;
        let iy = (row / nx) % ny;
        let iz = row / (nx * ny);
        (ix % 2) + 2 * (iy % 2) + 4 * (iz % 2)
    };
    let n = nx * ny * nz;

    let mut offsets = [0usize; 8];
    for row in 0..n {
        offsets[color(row)] += 1;
    }
    let mut next = 0;
    for offset in offsets.iter_mut() {
        let count = *offset;
        *offset = next;
        next += count;
    }

    (0..n)
        .map(|row| {
            let c = color(row);
            let pos = offsets[c];
            offsets[c] += 1;
            pos as LocalInt
        })
        .collect()
}
