//! Parallel sparse primitives: blocked product, row-wise split, term reweighting

use crate::error::{Result, SparseRecError};
use crate::observability::operation_span;
use crate::parallel::run_row_blocks;
use crate::sparse::{CsrBuilder, CsrMatrix};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Dense scratch row for Gustavson-style row accumulation
///
/// Touched columns are tracked so clearing costs O(touched), not O(n_cols).
pub struct RowAccumulator {
    sums: Vec<f64>,
    occupied: Vec<bool>,
    touched: Vec<usize>,
}

impl RowAccumulator {
    pub fn new(n_cols: usize) -> Self {
        Self {
            sums: vec![0.0; n_cols],
            occupied: vec![false; n_cols],
            touched: Vec::new(),
        }
    }

    pub fn add(&mut self, col: usize, value: f64) {
        self.sums[col] += value;
        if !self.occupied[col] {
            self.occupied[col] = true;
            self.touched.push(col);
        }
    }

    /// Drain the accumulated `(col, sum)` pairs in column order
    pub fn drain_sorted(&mut self) -> Vec<(usize, f64)> {
        self.touched.sort_unstable();
        let entries = self
            .touched
            .iter()
            .map(|&col| (col, self.sums[col]))
            .collect();
        for &col in &self.touched {
            self.sums[col] = 0.0;
            self.occupied[col] = false;
        }
        self.touched.clear();
        entries
    }
}

/// Multiply `left` by `right`, splitting `left`'s rows into `n_threads` blocks
///
/// The result does not depend on `n_threads`.
pub fn parallel_sparse_product(
    left: &CsrMatrix,
    right: &CsrMatrix,
    n_threads: usize,
) -> Result<CsrMatrix> {
    if n_threads == 0 {
        return Err(SparseRecError::invalid_argument(
            "n_threads",
            "must be greater than 0",
        ));
    }
    if left.n_cols() != right.n_rows() {
        return Err(SparseRecError::dimension_mismatch(format!(
            "cannot multiply {:?} by {:?}",
            left.shape(),
            right.shape()
        )));
    }

    let _span = operation_span("parallel_sparse_product", left.n_rows(), n_threads).entered();
    let blocks = run_row_blocks(left.n_rows(), n_threads, |rows| {
        let mut acc = RowAccumulator::new(right.n_cols());
        let mut builder = CsrBuilder::with_capacity(right.n_cols(), rows.len(), 0);
        for row in rows {
            let (cols, values) = left.row(row);
            for (&k, &lv) in cols.iter().zip(values) {
                let (right_cols, right_values) = right.row(k);
                for (&j, &rv) in right_cols.iter().zip(right_values) {
                    acc.add(j, lv * rv);
                }
            }
            builder.push_row(acc.drain_sorted())?;
        }
        Ok(builder.finish())
    })?;

    CsrMatrix::vstack(&blocks)
}

/// Split every row's nonzeros into train and test parts
///
/// For each row, the stored entries are shuffled with a generator seeded once
/// by `random_seed` and the first `floor(nnz * test_ratio)` go to the test
/// matrix. Returns `(train, test)`, both with `x`'s shape.
pub fn train_test_split_rowwise(
    x: &CsrMatrix,
    test_ratio: f64,
    random_seed: u64,
) -> Result<(CsrMatrix, CsrMatrix)> {
    if !(0.0..=1.0).contains(&test_ratio) {
        return Err(SparseRecError::invalid_argument(
            "test_ratio",
            format!("must be within [0, 1], got {}", test_ratio),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(random_seed);
    let mut train = Vec::with_capacity(x.nnz());
    let mut test = Vec::new();
    let mut order: Vec<usize> = Vec::new();

    for row in 0..x.n_rows() {
        let (cols, values) = x.row(row);
        order.clear();
        order.extend(0..cols.len());
        order.shuffle(&mut rng);

        let n_test = (cols.len() as f64 * test_ratio).floor() as usize;
        for (rank, &pos) in order.iter().enumerate() {
            let triplet = (row, cols[pos], values[pos]);
            if rank < n_test {
                test.push(triplet);
            } else {
                train.push(triplet);
            }
        }
    }

    tracing::debug!(
        rows = x.n_rows(),
        train_nnz = train.len(),
        test_nnz = test.len(),
        "row-wise split done"
    );

    Ok((
        CsrMatrix::from_triplets(x.n_rows(), x.n_cols(), &train)?,
        CsrMatrix::from_triplets(x.n_rows(), x.n_cols(), &test)?,
    ))
}

fn document_frequency(x: &CsrMatrix) -> Vec<f64> {
    let mut df = vec![0.0; x.n_cols()];
    for &col in x.indices() {
        df[col] += 1.0;
    }
    df
}

/// Okapi BM25 reweighting of the stored values
///
/// `idf = ln(N / (df + 1) + 1)`; each value `v` in a row of length `len`
/// becomes `idf * v * (k1 + 1) / (v + k1 * (1 - b + b * len / avg_len))`.
/// Negative values are rejected.
pub fn okapi_bm25_weight(x: &CsrMatrix, k1: f64, b: f64) -> Result<CsrMatrix> {
    if !(k1.is_finite() && k1 >= 0.0) {
        return Err(SparseRecError::invalid_argument(
            "k1",
            format!("must be a non-negative number, got {}", k1),
        ));
    }
    if !(0.0..=1.0).contains(&b) {
        return Err(SparseRecError::invalid_argument(
            "b",
            format!("must be within [0, 1], got {}", b),
        ));
    }

    x.ensure_non_negative("x")?;

    let n = x.n_rows() as f64;
    let doc_length = x.row_sums();
    let avg_length = doc_length.iter().sum::<f64>() / n;
    if x.nnz() == 0 || avg_length == 0.0 {
        return Ok(x.clone());
    }

    let idf: Vec<f64> = document_frequency(x)
        .into_iter()
        .map(|df| (n / (df + 1.0) + 1.0).ln())
        .collect();

    Ok(x.map_values(|row, col, value| {
        let regularizer = k1 * (1.0 - b + b * doc_length[row] / avg_length);
        idf[col] * (value * (k1 + 1.0)) / (value + regularizer)
    }))
}

/// TF-IDF reweighting: `v * ln(N / (df + smooth))`
pub fn tf_idf_weight(x: &CsrMatrix, smooth: bool) -> CsrMatrix {
    let n = x.n_rows() as f64;
    let smooth = if smooth { 1.0 } else { 0.0 };
    let idf: Vec<f64> = document_frequency(x)
        .into_iter()
        .map(|df| (n / (df + smooth)).ln())
        .collect();

    x.map_values(|_, col, value| value * idf[col])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_product_small() {
        let left = CsrMatrix::from_dense(array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]].view()).unwrap();
        let right =
            CsrMatrix::from_dense(array![[1.0, 2.0], [0.0, 1.0], [4.0, 0.0]].view()).unwrap();
        let product = parallel_sparse_product(&left, &right, 2).unwrap();
        assert_eq!(product.to_dense(), array![[9.0, 2.0], [0.0, 3.0]]);
    }

    #[test]
    fn test_product_more_threads_than_rows() {
        let left = CsrMatrix::from_dense(array![[1.0, 1.0]].view()).unwrap();
        let right = CsrMatrix::from_dense(array![[1.0], [2.0]].view()).unwrap();
        let product = parallel_sparse_product(&left, &right, 4).unwrap();
        assert_eq!(product.shape(), (1, 1));
        assert_eq!(product.get(0, 0), 3.0);
    }

    #[test]
    fn test_product_rejects_zero_threads_and_bad_shapes() {
        let m = CsrMatrix::zeros(2, 3);
        assert!(matches!(
            parallel_sparse_product(&m, &m.transpose(), 0),
            Err(SparseRecError::InvalidArgument { .. })
        ));
        assert!(matches!(
            parallel_sparse_product(&m, &m, 1),
            Err(SparseRecError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_split_rejects_bad_ratio() {
        let m = CsrMatrix::zeros(1, 1);
        assert!(train_test_split_rowwise(&m, 1.5, 0).is_err());
        assert!(train_test_split_rowwise(&m, -0.1, 0).is_err());
        assert!(train_test_split_rowwise(&m, f64::NAN, 0).is_err());
    }

    #[test]
    fn test_split_extremes() {
        let m = CsrMatrix::from_dense(array![[1.0, 2.0, 3.0], [0.0, 4.0, 5.0]].view()).unwrap();
        let (train, test) = train_test_split_rowwise(&m, 0.0, 3).unwrap();
        assert_eq!(train, m);
        assert_eq!(test.nnz(), 0);

        let (train, test) = train_test_split_rowwise(&m, 1.0, 3).unwrap();
        assert_eq!(train.nnz(), 0);
        assert_eq!(test, m);
    }

    #[test]
    fn test_bm25_known_value() {
        // Two documents, one term each; df = 1 for both terms.
        let m = CsrMatrix::from_dense(array![[2.0, 0.0], [0.0, 2.0]].view()).unwrap();
        let weighted = okapi_bm25_weight(&m, 1.2, 0.75).unwrap();
        let idf = (2.0f64 / 2.0 + 1.0).ln();
        let expected = idf * (2.0 * 2.2) / (2.0 + 1.2);
        assert!((weighted.get(0, 0) - expected).abs() < 1e-12);
        assert!((weighted.get(1, 1) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bm25_rejects_bad_parameters() {
        let m = CsrMatrix::zeros(1, 1);
        assert!(okapi_bm25_weight(&m, -1.0, 0.5).is_err());
        assert!(okapi_bm25_weight(&m, 1.0, 1.5).is_err());

        // -1 + k1 * (1 - b + b * len / avg) == 0 for this row
        let signed = CsrMatrix::from_dense(array![[-1.0, 0.0], [0.0, 1.0]].view()).unwrap();
        assert!(matches!(
            okapi_bm25_weight(&signed, 1.0, 0.0),
            Err(SparseRecError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_tf_idf_known_value() {
        let m = CsrMatrix::from_dense(array![[1.0, 3.0], [0.0, 1.0], [0.0, 2.0]].view()).unwrap();
        let weighted = tf_idf_weight(&m, true);
        assert!((weighted.get(0, 0) - (3.0f64 / 2.0).ln()).abs() < 1e-12);
        assert!((weighted.get(0, 1) - 3.0 * (3.0f64 / 4.0).ln()).abs() < 1e-12);

        let unsmoothed = tf_idf_weight(&m, false);
        assert!((unsmoothed.get(0, 0) - 3.0f64.ln()).abs() < 1e-12);
        // df == N gives an idf of exactly zero, but the position is kept.
        assert_eq!(unsmoothed.nnz(), m.nnz());
        assert_eq!(unsmoothed.get(2, 1), 0.0);
    }
}
