//! Level descriptor: local grid dimensions and process decomposition.
//!
//! Every rank owns an `nx × ny × nz` box of the global grid. Ranks are laid out
//! on an `npx × npy × npz` process grid. Along z the process grid may be split
//! into two blocks of ranks with different local `nz` (`pz` is the number of
//! process planes in the lower block).

use crate::error::{MgError, Result};
use crate::{GlobalInt, LocalInt};

/// Grid level descriptor for one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub size: usize,
    pub rank: usize,
    pub num_threads: usize,
    pub nx: LocalInt,
    pub ny: LocalInt,
    pub nz: LocalInt,
    pub npx: usize,
    pub npy: usize,
    pub npz: usize,
    /// Number of z process planes in the lower partition block, 0 if z is not split.
    pub pz: usize,
    /// Exclusive upper process-plane bound of each z block.
    pub partz_ids: Vec<usize>,
    /// Local nz of each z block.
    pub partz_nz: Vec<LocalInt>,
    pub ipx: usize,
    pub ipy: usize,
    pub ipz: usize,
    pub gnx: GlobalInt,
    pub gny: GlobalInt,
    pub gnz: GlobalInt,
    pub gix0: GlobalInt,
    pub giy0: GlobalInt,
    pub giz0: GlobalInt,
}

impl Geometry {
    /// Number of grid points owned by this rank.
    pub fn local_points(&self) -> GlobalInt {
        self.nx as GlobalInt * self.ny as GlobalInt * self.nz as GlobalInt
    }

    pub fn global_points(&self) -> GlobalInt {
        self.gnx * self.gny * self.gnz
    }

    /// Whether the z process axis is split into two blocks.
    pub fn is_z_partitioned(&self) -> bool {
        self.pz > 0
    }

    /// Local nz of the lower and upper z blocks, when z is split.
    pub fn z_blocks(&self) -> Option<(LocalInt, LocalInt)> {
        if self.is_z_partitioned() {
            Some((self.partz_nz[0], self.partz_nz[1]))
        } else {
            None
        }
    }

    /// Rank owning the given global row (grid point).
    pub fn rank_of_global_row(&self, row: GlobalInt) -> usize {
        let plane = self.gnx * self.gny;
        let iz = row / plane;
        let iy = (row - iz * plane) / self.gnx;
        let ix = row % self.gnx;

        let ipx = (ix / self.nx as GlobalInt) as usize;
        let ipy = (iy / self.ny as GlobalInt) as usize;

        let mut ipz = 0usize;
        let mut iz_rem = iz;
        let mut prev = 0usize;
        for (&ids, &block_nz) in self.partz_ids.iter().zip(&self.partz_nz) {
            let planes = ids - prev;
            let extent = block_nz as GlobalInt * planes as GlobalInt;
            if iz_rem < extent {
                ipz += (iz_rem / block_nz as GlobalInt) as usize;
                break;
            }
            ipz += planes;
            iz_rem -= extent;
            prev = ids;
        }

        ipx + ipy * self.npx + ipz * self.npy * self.npx
    }
}

/// Produces level descriptors. Used once for the fine level and once per
/// coarse level during hierarchy construction.
pub trait GeometryGenerator {
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        size: usize,
        rank: usize,
        num_threads: usize,
        pz: usize,
        zl: LocalInt,
        zu: LocalInt,
        nx: LocalInt,
        ny: LocalInt,
        nz: LocalInt,
        npx: usize,
        npy: usize,
        npz: usize,
    ) -> Result<Geometry>;
}

/// Structured box decomposition.
///
/// When `npx * npy * npz` does not match `size`, a balanced process grid is
/// chosen instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredGeometry;

impl GeometryGenerator for StructuredGeometry {
    fn build(
        &self,
        size: usize,
        rank: usize,
        num_threads: usize,
        pz: usize,
        zl: LocalInt,
        zu: LocalInt,
        nx: LocalInt,
        ny: LocalInt,
        nz: LocalInt,
        npx: usize,
        npy: usize,
        npz: usize,
    ) -> Result<Geometry> {
        if size == 0 || rank >= size {
            return Err(MgError::Precondition(format!(
                "rank {rank} is outside a communicator of size {size}"
            )));
        }
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(MgError::Precondition(format!(
                "local grid {nx}x{ny}x{nz} has an empty axis"
            )));
        }

        let (npx, npy, npz) = if npx * npy * npz == size {
            (npx, npy, npz)
        } else {
            optimal_process_grid(size)
        };

        let (partz_ids, partz_nz) = if pz == 0 {
            (vec![npz], vec![nz])
        } else {
            if pz >= npz {
                return Err(MgError::Precondition(format!(
                    "z split at process plane {pz} leaves no upper block (npz = {npz})"
                )));
            }
            if zl == 0 || zu == 0 {
                return Err(MgError::Precondition(format!(
                    "z blocks {zl}/{zu} must both be non-empty"
                )));
            }
            (vec![pz, npz], vec![zl, zu])
        };

        let ipz = rank / (npx * npy);
        let ipy = (rank - ipz * npx * npy) / npx;
        let ipx = rank % npx;

        // Local nz comes from the block this rank's process plane falls in.
        let mut local_nz = nz;
        for (&ids, &block_nz) in partz_ids.iter().zip(&partz_nz) {
            if ipz < ids {
                local_nz = block_nz;
                break;
            }
        }

        let gnx = npx as GlobalInt * nx as GlobalInt;
        let gny = npy as GlobalInt * ny as GlobalInt;

        let mut gnz: GlobalInt = 0;
        let mut giz0: GlobalInt = 0;
        let mut prev = 0usize;
        let mut origin_found = false;
        for (&ids, &block_nz) in partz_ids.iter().zip(&partz_nz) {
            let planes = (ids - prev) as GlobalInt;
            gnz += planes * block_nz as GlobalInt;
            if !origin_found {
                if ipz < ids {
                    giz0 += (ipz - prev) as GlobalInt * block_nz as GlobalInt;
                    origin_found = true;
                } else {
                    giz0 += planes * block_nz as GlobalInt;
                }
            }
            prev = ids;
        }

        Ok(Geometry {
            size,
            rank,
            num_threads,
            nx,
            ny,
            nz: local_nz,
            npx,
            npy,
            npz,
            pz,
            partz_ids,
            partz_nz,
            ipx,
            ipy,
            ipz,
            gnx,
            gny,
            gnz,
            gix0: ipx as GlobalInt * nx as GlobalInt,
            giy0: ipy as GlobalInt * ny as GlobalInt,
            giz0,
        })
    }
}

/// Factor `size` into the process grid with the smallest total extent.
fn optimal_process_grid(size: usize) -> (usize, usize, usize) {
    let mut best = (1, 1, size);
    let mut best_sum = 1 + 1 + size;
    for a in 1..=size {
        if size % a != 0 {
            continue;
        }
        let rest = size / a;
        for b in 1..=rest {
            if rest % b != 0 {
                continue;
            }
            let c = rest / b;
            if a + b + c < best_sum {
                best_sum = a + b + c;
                best = (a, b, c);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_rank(nx: LocalInt, ny: LocalInt, nz: LocalInt) -> Geometry {
        StructuredGeometry
            .build(1, 0, 1, 0, 0, 0, nx, ny, nz, 1, 1, 1)
            .unwrap()
    }

    #[test]
    fn single_rank_covers_global_grid() {
        let g = single_rank(8, 6, 4);
        assert_eq!((g.gnx, g.gny, g.gnz), (8, 6, 4));
        assert_eq!((g.gix0, g.giy0, g.giz0), (0, 0, 0));
        assert_eq!(g.local_points(), 192);
        assert_eq!(g.z_blocks(), None);
    }

    #[test]
    fn mismatched_process_grid_is_rebalanced() {
        let g = StructuredGeometry
            .build(8, 0, 1, 0, 0, 0, 4, 4, 4, 1, 1, 1)
            .unwrap();
        assert_eq!((g.npx, g.npy, g.npz), (2, 2, 2));
    }

    #[test]
    fn rank_coordinates_and_origin() {
        // 2x2x2 process grid, rank 5 -> (1, 0, 1)
        let g = StructuredGeometry
            .build(8, 5, 1, 0, 0, 0, 4, 4, 4, 2, 2, 2)
            .unwrap();
        assert_eq!((g.ipx, g.ipy, g.ipz), (1, 0, 1));
        assert_eq!((g.gix0, g.giy0, g.giz0), (4, 0, 4));
        assert_eq!(g.global_points(), 512);
    }

    #[test]
    fn z_partition_sets_local_nz_and_origin() {
        // 4 z planes of ranks, lower 1 plane has nz=8, upper 3 planes have nz=4.
        let lower = StructuredGeometry
            .build(4, 0, 1, 1, 8, 4, 4, 4, 8, 1, 1, 4)
            .unwrap();
        let upper = StructuredGeometry
            .build(4, 2, 1, 1, 8, 4, 4, 4, 8, 1, 1, 4)
            .unwrap();
        assert_eq!(lower.nz, 8);
        assert_eq!(upper.nz, 4);
        assert_eq!(lower.gnz, 8 + 3 * 4);
        assert_eq!(upper.giz0, 8 + 4);
        assert_eq!(upper.z_blocks(), Some((8, 4)));
    }

    #[test]
    fn rank_of_global_row_matches_owner() {
        let g = StructuredGeometry
            .build(2, 0, 1, 0, 0, 0, 4, 4, 4, 2, 1, 1)
            .unwrap();
        // gnx = 8: x in 0..4 is rank 0, x in 4..8 is rank 1.
        assert_eq!(g.rank_of_global_row(3), 0);
        assert_eq!(g.rank_of_global_row(4), 1);
        assert_eq!(g.rank_of_global_row(3 * 8 * 4 + 2 * 8 + 7), 1);
    }

    #[test]
    fn rank_of_global_row_with_z_partition() {
        let g = StructuredGeometry
            .build(3, 0, 1, 1, 4, 2, 2, 2, 4, 1, 1, 3)
            .unwrap();
        // z extents: rank 0 owns z 0..4, rank 1 owns 4..6, rank 2 owns 6..8.
        let plane = g.gnx * g.gny;
        assert_eq!(g.rank_of_global_row(3 * plane), 0);
        assert_eq!(g.rank_of_global_row(4 * plane), 1);
        assert_eq!(g.rank_of_global_row(7 * plane), 2);
    }

    #[test]
    fn rejects_empty_axis_and_bad_rank() {
        assert!(StructuredGeometry
            .build(1, 0, 1, 0, 0, 0, 0, 4, 4, 1, 1, 1)
            .is_err());
        assert!(StructuredGeometry
            .build(1, 1, 1, 0, 0, 0, 4, 4, 4, 1, 1, 1)
            .is_err());
    }
}
