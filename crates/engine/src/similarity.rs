//! K-nearest-neighbour similarity computers over sparse interaction matrices
//!
//! Entities are the rows of `X`. Each computer owns a copy of `X` (and its
//! transpose), computes every output row independently with a sparse row
//! accumulator, and assembles the rows in order through the row-block runner.
//! Self-similarity on the diagonal is kept.
//!
//! Variants:
//! - Cosine: `x_i.x_j / (sqrt(|x_i|^2 + s) * sqrt(|x_j|^2 + s))`
//! - Jaccard: `|S_i & S_j| / (|S_i | S_j| + s)` on the binarized pattern
//! - Asymmetric cosine: `x_i.x_j / (|x_i|^(2 alpha) * |x_j|^(2 (1 - alpha)) + s)`
//! - P3alpha: `rownorm(X)^alpha * rownorm(X^T)^alpha`, elementwise powers

use sparserec_core::observability::operation_span;
use sparserec_core::{run_row_blocks, CsrBuilder, CsrMatrix, Result, RowAccumulator, SparseRecError};
use std::cmp::Ordering;
use tracing::debug;

mod sealed {
    pub trait Sealed {}
}

/// Shared compute contract of the similarity computers
///
/// Sealed: the four computers in this module are the complete set.
pub trait SimilarityComputer: sealed::Sealed {
    /// Entity × entity similarity matrix
    fn compute_similarity(&self) -> Result<CsrMatrix>;
}

/// Inputs and knobs shared by every kernel
#[derive(Debug, Clone)]
struct KernelInput {
    x: CsrMatrix,
    x_t: CsrMatrix,
    n_threads: usize,
    top_k: Option<usize>,
}

impl KernelInput {
    fn new(x: &CsrMatrix, n_threads: usize) -> Result<Self> {
        check_threads(n_threads)?;
        Ok(Self {
            x: x.clone(),
            x_t: x.transpose(),
            n_threads,
            top_k: None,
        })
    }

    fn set_top_k(&mut self, top_k: usize) -> Result<()> {
        if top_k == 0 {
            return Err(SparseRecError::invalid_argument(
                "top_k",
                "must be greater than 0",
            ));
        }
        self.top_k = Some(top_k);
        Ok(())
    }
}

fn check_threads(n_threads: usize) -> Result<()> {
    if n_threads == 0 {
        return Err(SparseRecError::invalid_argument(
            "n_threads",
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn check_shrinkage(shrinkage: f64) -> Result<()> {
    if !(shrinkage.is_finite() && shrinkage >= 0.0) {
        return Err(SparseRecError::invalid_argument(
            "shrinkage",
            format!("must be a non-negative number, got {}", shrinkage),
        ));
    }
    Ok(())
}

/// Row-by-row `left * right` where `score(i, j, dot)` turns each raw inner
/// product into the final similarity
fn compute_rows<F>(
    name: &'static str,
    left: &CsrMatrix,
    right: &CsrMatrix,
    n_threads: usize,
    top_k: Option<usize>,
    normalize: bool,
    score: F,
) -> Result<CsrMatrix>
where
    F: Fn(usize, usize, f64) -> Option<f64> + Sync,
{
    let n_out = right.n_cols();
    let _span = operation_span(name, left.n_rows(), n_threads).entered();

    let blocks = run_row_blocks(left.n_rows(), n_threads, |range| {
        let mut acc = RowAccumulator::new(n_out);
        let mut builder = CsrBuilder::with_capacity(n_out, range.len(), 0);
        for i in range {
            let (features, values) = left.row(i);
            for (&f, &lv) in features.iter().zip(values) {
                let (others, other_values) = right.row(f);
                for (&j, &rv) in others.iter().zip(other_values) {
                    acc.add(j, lv * rv);
                }
            }

            let mut entries: Vec<(usize, f64)> = acc
                .drain_sorted()
                .into_iter()
                .filter_map(|(j, dot)| score(i, j, dot).map(|s| (j, s)))
                .filter(|&(_, s)| s != 0.0)
                .collect();
            if let Some(k) = top_k {
                keep_top_k(&mut entries, k);
            }
            if normalize {
                let total: f64 = entries.iter().map(|&(_, s)| s).sum();
                if total > 0.0 {
                    entries.iter_mut().for_each(|e| e.1 /= total);
                }
            }
            builder.push_row(entries)?;
        }
        Ok(builder.finish())
    })?;

    let similarity = CsrMatrix::vstack(&blocks)?;
    debug!(
        kernel = name,
        rows = similarity.n_rows(),
        nnz = similarity.nnz(),
        "similarity computed"
    );
    Ok(similarity)
}

/// Keep the `k` largest scores (ties go to the smaller column), back in column order
fn keep_top_k(entries: &mut Vec<(usize, f64)>, k: usize) {
    if entries.len() <= k {
        return;
    }
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    entries.truncate(k);
    entries.sort_by_key(|&(col, _)| col);
}

/// Cosine similarity with shrinkage and optional row normalization
#[derive(Debug, Clone)]
pub struct CosineSimilarityComputer {
    input: KernelInput,
    shrinkage: f64,
    normalize: bool,
}

impl CosineSimilarityComputer {
    pub fn new(x: &CsrMatrix, shrinkage: f64, normalize: bool, n_threads: usize) -> Result<Self> {
        check_shrinkage(shrinkage)?;
        Ok(Self {
            input: KernelInput::new(x, n_threads)?,
            shrinkage,
            normalize,
        })
    }

    /// Keep only the `top_k` most similar entities per row
    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        self.input.set_top_k(top_k)?;
        Ok(self)
    }
}

impl sealed::Sealed for CosineSimilarityComputer {}

impl SimilarityComputer for CosineSimilarityComputer {
    fn compute_similarity(&self) -> Result<CsrMatrix> {
        let input = &self.input;
        let norms: Vec<f64> = input
            .x
            .squared_row_norms()
            .into_iter()
            .map(|n| (n + self.shrinkage).sqrt())
            .collect();

        compute_rows(
            "cosine_similarity",
            &input.x,
            &input.x_t,
            input.n_threads,
            input.top_k,
            self.normalize,
            |i, j, dot| {
                let denominator = norms[i] * norms[j];
                (denominator > 0.0).then(|| dot / denominator)
            },
        )
    }
}

/// Jaccard similarity of the binarized interaction pattern
#[derive(Debug, Clone)]
pub struct JaccardSimilarityComputer {
    input: KernelInput,
    shrinkage: f64,
}

impl JaccardSimilarityComputer {
    pub fn new(x: &CsrMatrix, shrinkage: f64, n_threads: usize) -> Result<Self> {
        check_shrinkage(shrinkage)?;
        Ok(Self {
            input: KernelInput::new(&x.binarize(), n_threads)?,
            shrinkage,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        self.input.set_top_k(top_k)?;
        Ok(self)
    }
}

impl sealed::Sealed for JaccardSimilarityComputer {}

impl SimilarityComputer for JaccardSimilarityComputer {
    fn compute_similarity(&self) -> Result<CsrMatrix> {
        let input = &self.input;
        let sizes: Vec<f64> = (0..input.x.n_rows())
            .map(|row| input.x.row_nnz(row) as f64)
            .collect();

        compute_rows(
            "jaccard_similarity",
            &input.x,
            &input.x_t,
            input.n_threads,
            input.top_k,
            false,
            |i, j, intersection| {
                let denominator = sizes[i] + sizes[j] - intersection + self.shrinkage;
                (denominator > 0.0).then(|| intersection / denominator)
            },
        )
    }
}

/// Cosine with an asymmetry exponent on the two norms
///
/// `alpha = 0.5` recovers cosine (with shrinkage added outside the product).
#[derive(Debug, Clone)]
pub struct AsymmetricCosineSimilarityComputer {
    input: KernelInput,
    shrinkage: f64,
    alpha: f64,
}

impl AsymmetricCosineSimilarityComputer {
    pub fn new(x: &CsrMatrix, shrinkage: f64, alpha: f64, n_threads: usize) -> Result<Self> {
        check_shrinkage(shrinkage)?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(SparseRecError::invalid_argument(
                "alpha",
                format!("must be within [0, 1], got {}", alpha),
            ));
        }
        Ok(Self {
            input: KernelInput::new(x, n_threads)?,
            shrinkage,
            alpha,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        self.input.set_top_k(top_k)?;
        Ok(self)
    }
}

impl sealed::Sealed for AsymmetricCosineSimilarityComputer {}

impl SimilarityComputer for AsymmetricCosineSimilarityComputer {
    fn compute_similarity(&self) -> Result<CsrMatrix> {
        let input = &self.input;
        let squared_norms = input.x.squared_row_norms();
        let left: Vec<f64> = squared_norms.iter().map(|n| n.powf(self.alpha)).collect();
        let right: Vec<f64> = squared_norms
            .iter()
            .map(|n| n.powf(1.0 - self.alpha))
            .collect();

        compute_rows(
            "asymmetric_cosine_similarity",
            &input.x,
            &input.x_t,
            input.n_threads,
            input.top_k,
            false,
            |i, j, dot| {
                let denominator = left[i] * right[j] + self.shrinkage;
                (denominator > 0.0).then(|| dot / denominator)
            },
        )
    }
}

/// Three-hop random-walk similarity (P3alpha)
///
/// Transition probabilities entity → feature and feature → entity are the
/// row-normalized `X` and `X^T`, each raised elementwise to `alpha`.
#[derive(Debug, Clone)]
pub struct P3alphaComputer {
    input: KernelInput,
    alpha: f64,
    normalize: bool,
}

impl P3alphaComputer {
    pub fn new(x: &CsrMatrix, alpha: f64, normalize: bool, n_threads: usize) -> Result<Self> {
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(SparseRecError::invalid_argument(
                "alpha",
                format!("must be a non-negative number, got {}", alpha),
            ));
        }
        Ok(Self {
            input: KernelInput::new(x, n_threads)?,
            alpha,
            normalize,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        self.input.set_top_k(top_k)?;
        Ok(self)
    }

    /// Walk matrix `W = P_entity->feature * P_feature->entity`
    pub fn compute_w(&self) -> Result<CsrMatrix> {
        let input = &self.input;
        let alpha = self.alpha;
        let forward = input
            .x
            .row_normalize_l1()
            .map_values(|_, _, p| p.powf(alpha));
        let backward = input
            .x_t
            .row_normalize_l1()
            .map_values(|_, _, p| p.powf(alpha));

        compute_rows(
            "p3alpha",
            &forward,
            &backward,
            input.n_threads,
            input.top_k,
            self.normalize,
            |_, _, walk| Some(walk),
        )
    }
}

impl sealed::Sealed for P3alphaComputer {}

impl SimilarityComputer for P3alphaComputer {
    fn compute_similarity(&self) -> Result<CsrMatrix> {
        self.compute_w()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small() -> CsrMatrix {
        CsrMatrix::from_dense(
            array![
                [1.0, 1.0, 0.0, 0.0],
                [1.0, 0.0, 1.0, 0.0],
                [0.0, 2.0, 0.0, 3.0]
            ]
            .view(),
        )
        .unwrap()
    }

    #[test]
    fn test_cosine_known_values() {
        let sim = CosineSimilarityComputer::new(&small(), 0.0, false, 1)
            .unwrap()
            .compute_similarity()
            .unwrap();
        assert!((sim.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((sim.get(0, 1) - 0.5).abs() < 1e-12);
        let expected = 2.0 / (2.0f64.sqrt() * 13.0f64.sqrt());
        assert!((sim.get(0, 2) - expected).abs() < 1e-12);
        assert_eq!(sim.get(1, 2), 0.0);
    }

    #[test]
    fn test_jaccard_known_values() {
        let sim = JaccardSimilarityComputer::new(&small(), 1.0, 2)
            .unwrap()
            .compute_similarity()
            .unwrap();
        // rows 0 and 1 share one of three columns
        assert!((sim.get(0, 1) - 1.0 / 4.0).abs() < 1e-12);
        assert!((sim.get(0, 0) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_asymmetric_half_matches_cosine_without_shrinkage() {
        let x = small();
        let cosine = CosineSimilarityComputer::new(&x, 0.0, false, 1)
            .unwrap()
            .compute_similarity()
            .unwrap();
        let asymmetric = AsymmetricCosineSimilarityComputer::new(&x, 0.0, 0.5, 1)
            .unwrap()
            .compute_similarity()
            .unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!((cosine.get(i, j) - asymmetric.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_p3alpha_alpha_one_rows_are_stochastic() {
        let w = P3alphaComputer::new(&small(), 1.0, false, 1)
            .unwrap()
            .compute_w()
            .unwrap();
        for s in w.row_sums() {
            assert!((s - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_top_k_keeps_largest() {
        let sim = CosineSimilarityComputer::new(&small(), 0.0, false, 1)
            .unwrap()
            .with_top_k(1)
            .unwrap()
            .compute_similarity()
            .unwrap();
        for row in 0..3 {
            assert_eq!(sim.row_nnz(row), 1);
            assert_eq!(sim.row(row).0, &[row]);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let x = small();
        assert!(CosineSimilarityComputer::new(&x, -1.0, false, 1).is_err());
        assert!(CosineSimilarityComputer::new(&x, 0.0, false, 0).is_err());
        assert!(JaccardSimilarityComputer::new(&x, 0.0, 1)
            .unwrap()
            .with_top_k(0)
            .is_err());
        assert!(AsymmetricCosineSimilarityComputer::new(&x, 0.0, 1.5, 1).is_err());
        assert!(P3alphaComputer::new(&x, -0.5, false, 1).is_err());
    }
}
