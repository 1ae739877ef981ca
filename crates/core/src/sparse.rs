//! Row-compressed sparse interaction matrix
//!
//! Rows are entities (users, documents), columns are features (items, terms).
//! Column indices are strictly increasing inside every row. Constructors drop
//! explicit zeros; value-mapping transforms keep the sparsity pattern as is.

use crate::error::{Result, SparseRecError};
use ndarray::{Array2, ArrayView2};
use std::ops::Range;

/// Row-compressed (CSR) sparse matrix of `f64` values
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Empty matrix with the given shape
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            indptr: vec![0; n_rows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from raw CSR arrays
    ///
    /// Validates the structure and drops explicit zeros.
    pub fn from_parts(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<Self> {
        if indptr.len() != n_rows + 1 {
            return Err(SparseRecError::dimension_mismatch(format!(
                "indptr has length {} but {} rows require {}",
                indptr.len(),
                n_rows,
                n_rows + 1
            )));
        }
        if indices.len() != data.len() {
            return Err(SparseRecError::dimension_mismatch(format!(
                "indices ({}) and data ({}) lengths differ",
                indices.len(),
                data.len()
            )));
        }
        if indptr[0] != 0 || indptr[n_rows] != indices.len() {
            return Err(SparseRecError::invalid_argument(
                "indptr",
                "must start at 0 and end at the number of stored entries",
            ));
        }

        if let Some(row) = indptr.windows(2).position(|pair| pair[0] > pair[1]) {
            return Err(SparseRecError::invalid_argument(
                "indptr",
                format!("decreasing at row {}", row),
            ));
        }

        let mut builder = CsrBuilder::with_capacity(n_cols, n_rows, indices.len());
        for row in 0..n_rows {
            let (start, end) = (indptr[row], indptr[row + 1]);
            builder.push_row(
                indices[start..end]
                    .iter()
                    .copied()
                    .zip(data[start..end].iter().copied()),
            )?;
        }
        Ok(builder.finish())
    }

    /// Build from `(row, col, value)` triplets; duplicate positions are summed
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self> {
        for &(row, col, value) in triplets {
            if row >= n_rows {
                return Err(SparseRecError::OutOfRange {
                    index: row,
                    len: n_rows,
                });
            }
            if col >= n_cols {
                return Err(SparseRecError::OutOfRange {
                    index: col,
                    len: n_cols,
                });
            }
            check_finite(value)?;
        }

        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut builder = CsrBuilder::with_capacity(n_cols, n_rows, sorted.len());
        let mut cursor = 0;
        for row in 0..n_rows {
            let mut merged: Vec<(usize, f64)> = Vec::new();
            while cursor < sorted.len() && sorted[cursor].0 == row {
                let (_, col, value) = sorted[cursor];
                match merged.last_mut() {
                    Some(last) if last.0 == col => last.1 += value,
                    _ => merged.push((col, value)),
                }
                cursor += 1;
            }
            builder.push_row(merged)?;
        }
        Ok(builder.finish())
    }

    /// Build from a dense array, keeping the nonzero entries
    pub fn from_dense(dense: ArrayView2<f64>) -> Result<Self> {
        let (n_rows, n_cols) = dense.dim();
        let mut builder = CsrBuilder::new(n_cols);
        for row in dense.outer_iter() {
            builder.push_row(row.iter().copied().enumerate())?;
        }
        debug_assert_eq!(builder.n_rows(), n_rows);
        Ok(builder.finish())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Column indices and values of one row
    ///
    /// # Panics
    ///
    /// Panics if `row >= n_rows`.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.indptr[row]..self.indptr[row + 1];
        (&self.indices[range.clone()], &self.data[range])
    }

    pub fn row_nnz(&self, row: usize) -> usize {
        self.indptr[row + 1] - self.indptr[row]
    }

    /// Stored value at `(row, col)`, zero when absent
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.n_rows {
            return 0.0;
        }
        let (cols, values) = self.row(row);
        cols.binary_search(&col).map(|pos| values[pos]).unwrap_or(0.0)
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| self.row(row).1.iter().sum())
            .collect()
    }

    pub fn squared_row_norms(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| self.row(row).1.iter().map(|v| v * v).sum())
            .collect()
    }

    pub fn transpose(&self) -> CsrMatrix {
        let mut counts = vec![0usize; self.n_cols + 1];
        for &col in &self.indices {
            counts[col + 1] += 1;
        }
        for col in 0..self.n_cols {
            counts[col + 1] += counts[col];
        }

        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0usize; self.nnz()];
        let mut data = vec![0.0; self.nnz()];
        // Rows are visited in increasing order, so each transposed row stays sorted.
        for row in 0..self.n_rows {
            let (cols, values) = self.row(row);
            for (&col, &value) in cols.iter().zip(values) {
                let slot = next[col];
                indices[slot] = row;
                data[slot] = value;
                next[col] += 1;
            }
        }

        CsrMatrix {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
            data,
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::<f64>::zeros((self.n_rows, self.n_cols));
        for row in 0..self.n_rows {
            let (cols, values) = self.row(row);
            for (&col, &value) in cols.iter().zip(values) {
                dense[[row, col]] = value;
            }
        }
        dense
    }

    /// Apply `f(row, col, value)` to every stored entry, keeping the pattern
    pub fn map_values<F>(&self, mut f: F) -> CsrMatrix
    where
        F: FnMut(usize, usize, f64) -> f64,
    {
        let mut data = Vec::with_capacity(self.nnz());
        for row in 0..self.n_rows {
            let (cols, values) = self.row(row);
            for (&col, &value) in cols.iter().zip(values) {
                data.push(f(row, col, value));
            }
        }
        CsrMatrix {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            indptr: self.indptr.clone(),
            indices: self.indices.clone(),
            data,
        }
    }

    /// Fail with `InvalidArgument` on the first negative stored value
    pub fn ensure_non_negative(&self, field: &str) -> Result<()> {
        match self.data.iter().position(|&v| v < 0.0) {
            Some(pos) => Err(SparseRecError::invalid_argument(
                field,
                format!(
                    "interaction values must be non-negative, found {} at column {}",
                    self.data[pos], self.indices[pos]
                ),
            )),
            None => Ok(()),
        }
    }

    /// Same pattern with every stored value set to 1
    pub fn binarize(&self) -> CsrMatrix {
        self.map_values(|_, _, _| 1.0)
    }

    /// Divide each row by its value sum; rows summing to zero are left untouched
    pub fn row_normalize_l1(&self) -> CsrMatrix {
        let sums = self.row_sums();
        self.map_values(|row, _, value| {
            if sums[row] != 0.0 {
                value / sums[row]
            } else {
                value
            }
        })
    }

    /// Contiguous row slice as a new matrix
    pub fn middle_rows(&self, rows: Range<usize>) -> Result<CsrMatrix> {
        if rows.start > rows.end || rows.end > self.n_rows {
            return Err(SparseRecError::OutOfRange {
                index: rows.end,
                len: self.n_rows,
            });
        }
        let (start, end) = (self.indptr[rows.start], self.indptr[rows.end]);
        let indptr = self.indptr[rows.start..=rows.end]
            .iter()
            .map(|p| p - start)
            .collect();
        Ok(CsrMatrix {
            n_rows: rows.end - rows.start,
            n_cols: self.n_cols,
            indptr,
            indices: self.indices[start..end].to_vec(),
            data: self.data[start..end].to_vec(),
        })
    }

    /// Stack row blocks vertically, preserving their order
    pub fn vstack(blocks: &[CsrMatrix]) -> Result<CsrMatrix> {
        let n_cols = match blocks.first() {
            Some(first) => first.n_cols,
            None => return Ok(CsrMatrix::zeros(0, 0)),
        };
        if let Some(bad) = blocks.iter().find(|b| b.n_cols != n_cols) {
            return Err(SparseRecError::dimension_mismatch(format!(
                "cannot stack blocks with {} and {} columns",
                n_cols, bad.n_cols
            )));
        }

        let n_rows = blocks.iter().map(|b| b.n_rows).sum();
        let nnz = blocks.iter().map(|b| b.nnz()).sum();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);
        for block in blocks {
            let offset = indices.len();
            indptr.extend(block.indptr[1..].iter().map(|p| p + offset));
            indices.extend_from_slice(&block.indices);
            data.extend_from_slice(&block.data);
        }

        Ok(CsrMatrix {
            n_rows,
            n_cols,
            indptr,
            indices,
            data,
        })
    }
}

/// Incremental row-by-row CSR construction
///
/// Rows must be pushed in order with strictly increasing column indices.
/// Zero values are skipped.
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrBuilder {
    pub fn new(n_cols: usize) -> Self {
        Self::with_capacity(n_cols, 0, 0)
    }

    pub fn with_capacity(n_cols: usize, rows: usize, nnz: usize) -> Self {
        let mut indptr = Vec::with_capacity(rows + 1);
        indptr.push(0);
        Self {
            n_cols,
            indptr,
            indices: Vec::with_capacity(nnz),
            data: Vec::with_capacity(nnz),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    /// Append one row given as `(col, value)` pairs
    ///
    /// On error the builder is left unchanged.
    pub fn push_row<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let rollback = self.indices.len();
        let mut previous: Option<usize> = None;
        for (col, value) in entries {
            let checked = if col >= self.n_cols {
                Err(SparseRecError::OutOfRange {
                    index: col,
                    len: self.n_cols,
                })
            } else if previous.map_or(false, |p| col <= p) {
                Err(SparseRecError::invalid_argument(
                    "indices",
                    format!(
                        "column {} is not strictly increasing in row {}",
                        col,
                        self.n_rows()
                    ),
                ))
            } else {
                check_finite(value)
            };
            if let Err(e) = checked {
                self.indices.truncate(rollback);
                self.data.truncate(rollback);
                return Err(e);
            }

            previous = Some(col);
            if value != 0.0 {
                self.indices.push(col);
                self.data.push(value);
            }
        }
        self.indptr.push(self.indices.len());
        Ok(())
    }

    pub fn finish(self) -> CsrMatrix {
        CsrMatrix {
            n_rows: self.indptr.len() - 1,
            n_cols: self.n_cols,
            indptr: self.indptr,
            indices: self.indices,
            data: self.data,
        }
    }
}

fn check_finite(value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SparseRecError::invalid_argument(
            "data",
            format!("non-finite value {}", value),
        ))
    }
}
