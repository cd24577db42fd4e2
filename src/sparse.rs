//! Compressed Sparse Row (CSR) matrix.
//!
//! The problem assembler emits rows with global column indices
//! (`CsrMatrix<GlobalInt>`); halo setup rewrites them into local column
//! indices (`CsrMatrix<LocalInt>`) before the structure is uploaded.

use crate::LocalInt;

/// Sparse matrix in Compressed Sparse Row format, generic over the column index type.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<I = LocalInt> {
    pub nrows: usize,
    pub ncols: usize,
    /// Non-zero values, stored row by row.
    pub values: Vec<f64>,
    /// Column index for each non-zero value.
    pub col_indices: Vec<I>,
    /// `row_pointers[i]` is the index into values/col_indices where row i starts.
    /// `row_pointers[nrows]` = total number of non-zeros.
    pub row_pointers: Vec<usize>,
}

impl<I: Copy> CsrMatrix<I> {
    /// Create an empty matrix ready for `push_row`.
    pub fn with_capacity(ncols: usize, nrows_hint: usize, nnz_hint: usize) -> Self {
        let mut row_pointers = Vec::with_capacity(nrows_hint + 1);
        row_pointers.push(0);
        Self {
            nrows: 0,
            ncols,
            values: Vec::with_capacity(nnz_hint),
            col_indices: Vec::with_capacity(nnz_hint),
            row_pointers,
        }
    }

    /// Append one row.
    pub fn push_row(&mut self, cols: &[I], vals: &[f64]) {
        debug_assert_eq!(cols.len(), vals.len());
        self.col_indices.extend_from_slice(cols);
        self.values.extend_from_slice(vals);
        self.row_pointers.push(self.values.len());
        self.nrows += 1;
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[I], &[f64]) {
        let range = self.row_pointers[i]..self.row_pointers[i + 1];
        (&self.col_indices[range.clone()], &self.values[range])
    }
}

impl CsrMatrix<LocalInt> {
    /// Sparse matrix-vector multiply: y = A * x
    pub fn spmv(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.ncols, "spmv dimension mismatch");
        (0..self.nrows)
            .map(|row| {
                let (cols, vals) = self.row(row);
                cols.iter()
                    .zip(vals)
                    .map(|(&c, &v)| v * x[c as usize])
                    .sum()
            })
            .collect()
    }

    /// Row pointers narrowed to the index width used on the device.
    pub fn row_pointers_local(&self) -> Option<Vec<LocalInt>> {
        self.row_pointers
            .iter()
            .map(|&p| LocalInt::try_from(p).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matrix() {
        let m: CsrMatrix = CsrMatrix::with_capacity(3, 0, 0);
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.nrows, 0);
        assert_eq!(m.row_pointers, vec![0]);
    }

    #[test]
    fn test_push_row_and_row_access() {
        let mut m: CsrMatrix = CsrMatrix::with_capacity(3, 2, 4);
        m.push_row(&[0, 2], &[1.0, 2.0]);
        m.push_row(&[1], &[3.0]);
        assert_eq!(m.nrows, 2);
        assert_eq!(m.row_pointers, vec![0, 2, 3]);
        assert_eq!(m.row(0), (&[0u32, 2][..], &[1.0, 2.0][..]));
        assert_eq!(m.row(1), (&[1u32][..], &[3.0][..]));
    }

    #[test]
    fn test_spmv() {
        // [[2, 1], [0, 3]] * [1, 2] = [4, 6]
        let mut m: CsrMatrix = CsrMatrix::with_capacity(2, 2, 3);
        m.push_row(&[0, 1], &[2.0, 1.0]);
        m.push_row(&[1], &[3.0]);
        assert_eq!(m.spmv(&[1.0, 2.0]), vec![4.0, 6.0]);
    }
}
