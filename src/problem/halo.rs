//! Halo setup for structured levels.
//!
//! Local ordering: owned rows first (0..local_rows), external columns after,
//! grouped by owning rank in ascending rank order and ascending global index
//! within a rank. Received values for one neighbor therefore land in a
//! contiguous slice.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::device::Device;
use crate::error::{MgError, Result};
use crate::geometry::Geometry;
use crate::level::{HaloInfo, SparseLevel};
use crate::sparse::CsrMatrix;
use crate::{GlobalInt, LocalInt};

use super::HaloSetup;

/// Derives halo metadata from the level's box decomposition.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredHalo;

/// Local row of a global grid point, if this rank owns it.
fn owned_local(geom: &Geometry, global: GlobalInt) -> Option<usize> {
    let plane = geom.gnx * geom.gny;
    let gz = global / plane;
    let gy = (global - gz * plane) / geom.gnx;
    let gx = global % geom.gnx;
    let inside = |g: GlobalInt, g0: GlobalInt, n: LocalInt| g >= g0 && g < g0 + n as GlobalInt;
    if !(inside(gx, geom.gix0, geom.nx)
        && inside(gy, geom.giy0, geom.ny)
        && inside(gz, geom.giz0, geom.nz))
    {
        return None;
    }
    let (lx, ly, lz) = (
        (gx - geom.gix0) as usize,
        (gy - geom.giy0) as usize,
        (gz - geom.giz0) as usize,
    );
    Some(lz * geom.nx as usize * geom.ny as usize + ly * geom.nx as usize + lx)
}

impl HaloSetup for StructuredHalo {
    fn setup<D: Device>(&self, device: &D, level: &mut SparseLevel<D>) -> Result<()> {
        let rows = level.take_assembled()?;
        let geom = level.geometry();
        let local_rows = rows.nrows;
        let _span = tracing::debug_span!("halo_setup", rank = geom.rank, local_rows).entered();

        // Pass 1: which columns come from which rank, and which local rows
        // every neighbor needs (the stencil is symmetric).
        let mut receive: BTreeMap<usize, BTreeSet<GlobalInt>> = BTreeMap::new();
        let mut send: BTreeMap<usize, BTreeSet<LocalInt>> = BTreeMap::new();
        for row in 0..local_rows {
            let (cols, _) = rows.row(row);
            for &col in cols {
                if owned_local(geom, col).is_some() {
                    continue;
                }
                let owner = geom.rank_of_global_row(col);
                if owner == geom.rank {
                    return Err(MgError::Setup(format!(
                        "column {col} maps to rank {owner} but lies outside its box"
                    )));
                }
                receive.entry(owner).or_default().insert(col);
                send.entry(owner).or_default().insert(row as LocalInt);
            }
        }

        // Pass 2: external columns get local indices after the owned rows.
        let mut external: HashMap<GlobalInt, usize> = HashMap::new();
        let mut next = local_rows;
        for cols in receive.values() {
            for &col in cols {
                external.insert(col, next);
                next += 1;
            }
        }
        let num_external = external.len();
        let local_cols = local_rows + num_external;
        if LocalInt::try_from(local_cols).is_err() {
            return Err(MgError::Precondition(format!(
                "{local_cols} local columns do not fit the local index type"
            )));
        }

        let mut col_indices = Vec::with_capacity(rows.nnz());
        for &col in &rows.col_indices {
            let local = match owned_local(geom, col) {
                Some(local) => local,
                None => *external.get(&col).ok_or_else(|| {
                    MgError::Setup(format!("column {col} missing from the halo map"))
                })?,
            };
            col_indices.push(local as LocalInt);
        }
        let local = CsrMatrix {
            nrows: local_rows,
            ncols: local_cols,
            values: rows.values,
            col_indices,
            row_pointers: rows.row_pointers,
        };

        let neighbors: Vec<usize> = receive.keys().copied().collect();
        let receive_lengths: Vec<usize> = receive.values().map(BTreeSet::len).collect();
        let send_lengths: Vec<usize> = neighbors
            .iter()
            .map(|r| send.get(r).map_or(0, BTreeSet::len))
            .collect();
        let elements_to_send: Vec<LocalInt> = neighbors
            .iter()
            .filter_map(|r| send.get(r))
            .flat_map(|rows| rows.iter().copied())
            .collect();

        let halo = HaloInfo {
            num_external,
            total_to_send: elements_to_send.len(),
            neighbors,
            receive_lengths,
            send_lengths,
        };
        tracing::debug!(
            neighbors = halo.neighbors.len(),
            num_external,
            total_to_send = halo.total_to_send,
            "halo built"
        );
        level.set_halo(device, local, halo, &elements_to_send)
    }
}
