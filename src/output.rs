//! Hierarchy summary output (CSV).

use std::io::Write;

use crate::device::Device;
use crate::error::Result;
use crate::level::SparseLevel;

/// One CSV row per level of a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSummary {
    /// 0 for the finest level.
    pub level: usize,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    /// Fine entries touched by a unit prolongation from the next coarser
    /// level; 0 on the coarsest level.
    pub prolongated: usize,
}

impl LevelSummary {
    pub fn new<D: Device>(level: usize, sparse: &SparseLevel<D>, prolongated: usize) -> Self {
        let g = sparse.geometry();
        Self {
            level,
            nx: g.nx,
            ny: g.ny,
            nz: g.nz,
            rows: sparse.local_rows(),
            cols: sparse.local_cols(),
            nnz: sparse.nnz(),
            prolongated,
        }
    }
}

/// Write a hierarchy summary as CSV.
///
/// Format:
/// ```csv
/// level,nx,ny,nz,rows,cols,nnz,prolongated
/// 0,16,16,16,4096,4096,97336,512
/// 1,8,8,8,512,512,10648,64
/// ```
pub fn write_hierarchy_csv<W: Write>(levels: &[LevelSummary], writer: &mut W) -> Result<()> {
    writeln!(writer, "level,nx,ny,nz,rows,cols,nnz,prolongated")?;
    for l in levels {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            l.level, l.nx, l.ny, l.nz, l.rows, l.cols, l.nnz, l.prolongated
        )?;
    }
    Ok(())
}
