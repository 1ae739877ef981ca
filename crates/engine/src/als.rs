//! Implicit-feedback matrix factorization using Alternating Least Squares (ALS)
//!
//! Decomposes a user × item interaction matrix `X` into user factors `U` and
//! item factors `V`. Every stored value `r` must be non-negative and is a
//! confidence-weighted observation with confidence `1 + alpha * r`; absent
//! entries are observations of 0 with confidence 1. One sweep solves every
//! user row with `V` fixed, then every item row with `U` fixed.
//!
//! Each row solve uses the implicit-ALS identity
//! `V^T C_u V = V^T V + sum_{i in nz(u)} (c_ui - 1) v_i v_i^T`, so the cost per
//! sweep is linear in the number of stored interactions.

use crate::learning_config::LearningConfig;
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use sparserec_core::observability::operation_span;
use sparserec_core::{
    run_row_blocks, CsrMatrix, PersistentState, Result, SparseRecError, StateValue,
};
use std::time::Instant;
use tracing::debug;

/// Training interactions in both orientations
#[derive(Debug, Clone)]
struct Interactions {
    by_user: CsrMatrix,
    by_item: CsrMatrix,
}

impl Interactions {
    fn new(x: &CsrMatrix) -> Self {
        Self {
            by_user: x.clone(),
            by_item: x.transpose(),
        }
    }
}

/// ALS trainer owning the factor matrices
///
/// Sweeps take `&mut self`; parallelism happens only across rows inside one
/// half-sweep.
#[derive(Debug, Clone)]
pub struct ALSTrainer {
    config: LearningConfig,
    /// User latent factors: [num_users x K]
    user: Array2<f64>,
    /// Item latent factors: [num_items x K]
    item: Array2<f64>,
    interactions: Option<Interactions>,
}

impl ALSTrainer {
    /// Fresh trainer for `x` (users × items) with seeded Gaussian factors
    pub fn new(config: LearningConfig, x: &CsrMatrix) -> Result<Self> {
        x.ensure_non_negative("x")?;
        let k = config.k();
        let normal = Normal::new(0.0, config.init_stdev()).map_err(|e| {
            SparseRecError::invalid_argument("init_stdev", format!("invalid spread: {}", e))
        })?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed());

        let user = Array2::from_shape_fn((x.n_rows(), k), |_| normal.sample(&mut rng));
        let item = Array2::from_shape_fn((x.n_cols(), k), |_| normal.sample(&mut rng));

        debug!(
            users = x.n_rows(),
            items = x.n_cols(),
            nnz = x.nnz(),
            k,
            "ALS trainer initialized"
        );

        Ok(Self {
            config,
            user,
            item,
            interactions: Some(Interactions::new(x)),
        })
    }

    /// Restore a trainer from previously fitted factors, skipping initialization
    ///
    /// The restored trainer can score and fold in rows right away; call
    /// [`attach_interactions`](Self::attach_interactions) to keep training.
    pub fn from_factors(config: LearningConfig, user: Array2<f64>, item: Array2<f64>) -> Result<Self> {
        check_factor_width(&config, &user, "user")?;
        check_factor_width(&config, &item, "item")?;
        Ok(Self {
            config,
            user,
            item,
            interactions: None,
        })
    }

    /// Attach the interaction matrix that subsequent sweeps train on
    pub fn attach_interactions(&mut self, x: &CsrMatrix) -> Result<()> {
        x.ensure_non_negative("x")?;
        if x.shape() != (self.user.nrows(), self.item.nrows()) {
            return Err(SparseRecError::dimension_mismatch(format!(
                "interaction matrix {:?} does not match factors ({} users, {} items)",
                x.shape(),
                self.user.nrows(),
                self.item.nrows()
            )));
        }
        self.interactions = Some(Interactions::new(x));
        Ok(())
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn user_factors(&self) -> ArrayView2<'_, f64> {
        self.user.view()
    }

    pub fn item_factors(&self) -> ArrayView2<'_, f64> {
        self.item.view()
    }

    /// Replace the user factors
    ///
    /// The width must equal K, and the height must equal the number of users
    /// when an interaction matrix is attached.
    pub fn set_user_factors(&mut self, user: Array2<f64>) -> Result<()> {
        check_factor_width(&self.config, &user, "user")?;
        if let Some(data) = &self.interactions {
            check_factor_height(data.by_user.n_rows(), &user, "user")?;
        }
        self.user = user;
        Ok(())
    }

    /// Replace the item factors; same checks as [`set_user_factors`](Self::set_user_factors)
    pub fn set_item_factors(&mut self, item: Array2<f64>) -> Result<()> {
        check_factor_width(&self.config, &item, "item")?;
        if let Some(data) = &self.interactions {
            check_factor_height(data.by_item.n_rows(), &item, "item")?;
        }
        self.item = item;
        Ok(())
    }

    /// Run one full ALS sweep (users, then items)
    ///
    /// Factors are replaced only once both halves succeed.
    pub fn step(&mut self) -> Result<()> {
        let data = self.interactions.as_ref().ok_or_else(|| {
            SparseRecError::invalid_argument(
                "interactions",
                "no interaction matrix attached to this trainer",
            )
        })?;

        let started = Instant::now();
        let user = solve_rows(&data.by_user, &self.item, &self.config)?;
        let item = solve_rows(&data.by_item, &user, &self.config)?;
        self.user = user;
        self.item = item;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            n_threads = self.config.n_threads(),
            "ALS sweep finished"
        );
        Ok(())
    }

    /// Run `epochs` sweeps, logging the objective when debug logging is enabled
    pub fn fit(&mut self, epochs: usize) -> Result<()> {
        for epoch in 0..epochs {
            self.step()?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                let loss = self.objective()?;
                debug!(epoch, loss, "ALS epoch");
            }
        }
        Ok(())
    }

    /// Implicit-ALS objective on the attached interactions
    ///
    /// `sum_{u,i} c_ui (r_ui - u.v)^2 + reg * (|U|^2 + |V|^2)`, summed over all
    /// user-item pairs.
    pub fn objective(&self) -> Result<f64> {
        let data = self.interactions.as_ref().ok_or_else(|| {
            SparseRecError::invalid_argument(
                "interactions",
                "no interaction matrix attached to this trainer",
            )
        })?;

        // sum over all pairs of (u.v)^2 == sum((U G) * U) with G = V^T V
        let gram = self.item.t().dot(&self.item);
        let mut loss = (self.user.dot(&gram) * &self.user).sum();

        let alpha = self.config.alpha();
        for u in 0..data.by_user.n_rows() {
            let (cols, values) = data.by_user.row(u);
            let user_row = self.user.row(u);
            for (&i, &r) in cols.iter().zip(values) {
                let prediction = user_row.dot(&self.item.row(i));
                let confidence = 1.0 + alpha * r;
                loss += confidence * (r - prediction).powi(2) - prediction * prediction;
            }
        }

        let penalty = self.user.iter().map(|v| v * v).sum::<f64>()
            + self.item.iter().map(|v| v * v).sum::<f64>();
        Ok(loss + self.config.reg() * penalty)
    }

    /// Dense scores of one user against every item: `U[user] . V^T`
    pub fn user_scores(&self, user_index: usize) -> Result<Array1<f64>> {
        if user_index >= self.user.nrows() {
            return Err(SparseRecError::OutOfRange {
                index: user_index,
                len: self.user.nrows(),
            });
        }
        Ok(self.item.dot(&self.user.row(user_index)))
    }

    /// Fold in new user rows (over the trained items) against the item factors
    ///
    /// Returns one K-dimensional factor per input row; the trainer is untouched.
    pub fn transform_user(&self, rows: &CsrMatrix) -> Result<Array2<f64>> {
        if rows.n_cols() != self.item.nrows() {
            return Err(SparseRecError::dimension_mismatch(format!(
                "user rows have {} columns but the model has {} items",
                rows.n_cols(),
                self.item.nrows()
            )));
        }
        rows.ensure_non_negative("rows")?;
        solve_rows(rows, &self.item, &self.config)
    }

    /// Fold in new item rows (over the trained users) against the user factors
    pub fn transform_item(&self, rows: &CsrMatrix) -> Result<Array2<f64>> {
        if rows.n_cols() != self.user.nrows() {
            return Err(SparseRecError::dimension_mismatch(format!(
                "item rows have {} columns but the model has {} users",
                rows.n_cols(),
                self.user.nrows()
            )));
        }
        rows.ensure_non_negative("rows")?;
        solve_rows(rows, &self.user, &self.config)
    }
}

/// State layout: `(config, U, V)`; interactions are not persisted
impl PersistentState for ALSTrainer {
    fn to_state(&self) -> StateValue {
        StateValue::Tuple(vec![
            self.config.to_state(),
            StateValue::matrix(self.user.view()),
            StateValue::matrix(self.item.view()),
        ])
    }

    fn from_state(state: &StateValue) -> Result<Self> {
        let fields = state.expect_tuple(3, "ALSTrainer")?;
        let config = LearningConfig::from_state(&fields[0])?;
        let user = fields[1].to_array("user")?;
        let item = fields[2].to_array("item")?;
        ALSTrainer::from_factors(config, user, item)
    }
}

fn check_factor_width(config: &LearningConfig, factors: &Array2<f64>, name: &str) -> Result<()> {
    if factors.ncols() != config.k() {
        return Err(SparseRecError::dimension_mismatch(format!(
            "{} factors have {} columns but K = {}",
            name,
            factors.ncols(),
            config.k()
        )));
    }
    Ok(())
}

fn check_factor_height(expected: usize, factors: &Array2<f64>, name: &str) -> Result<()> {
    if factors.nrows() != expected {
        return Err(SparseRecError::dimension_mismatch(format!(
            "{} factors have {} rows but the interaction matrix has {}",
            name,
            factors.nrows(),
            expected
        )));
    }
    Ok(())
}

/// Solve every row of `rows` against the fixed factor matrix `other`
fn solve_rows(rows: &CsrMatrix, other: &Array2<f64>, config: &LearningConfig) -> Result<Array2<f64>> {
    let k = config.k();
    let gram = other.t().dot(other);

    let _span = operation_span("als_solve_rows", rows.n_rows(), config.n_threads()).entered();
    let blocks = run_row_blocks(rows.n_rows(), config.n_threads(), |range| {
        let mut block = Array2::<f64>::zeros((range.len(), k));
        for (offset, row) in range.enumerate() {
            let (cols, values) = rows.row(row);
            let solution = solve_row(&gram, other, cols, values, config)?;
            block.row_mut(offset).assign(&solution);
        }
        Ok(block)
    })?;

    let views: Vec<ArrayView2<f64>> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| SparseRecError::dimension_mismatch(e.to_string()))
}

/// Solve `(G + sum (c - 1) v v^T + reg I) x = sum c r v` for one row
fn solve_row(
    gram: &Array2<f64>,
    other: &Array2<f64>,
    cols: &[usize],
    values: &[f64],
    config: &LearningConfig,
) -> Result<Array1<f64>> {
    let k = gram.nrows();
    if cols.is_empty() {
        // b = 0 and A is SPD, so the solution is exactly zero
        return Ok(Array1::zeros(k));
    }

    let mut a = gram.clone();
    let mut b = Array1::<f64>::zeros(k);
    for (&col, &rating) in cols.iter().zip(values) {
        let v = other.row(col);
        let confidence = 1.0 + config.alpha() * rating;

        let weight = confidence - 1.0;
        if weight != 0.0 {
            for i in 0..k {
                let wi = weight * v[i];
                for j in 0..k {
                    a[[i, j]] += wi * v[j];
                }
            }
        }

        b.scaled_add(confidence * rating, &v);
    }

    for i in 0..k {
        a[[i, i]] += config.reg();
    }

    cholesky_solve_in_place(&mut a, &mut b)?;
    Ok(b)
}

/// Overwrite `b` with the solution of `a x = b` for symmetric positive definite `a`
///
/// The lower triangle of `a` is replaced by its Cholesky factor `L`; the upper
/// triangle is never read.
fn cholesky_solve_in_place(a: &mut Array2<f64>, b: &mut Array1<f64>) -> Result<()> {
    let n = a.nrows();

    for j in 0..n {
        let row_j = a.slice(s![j, ..j]);
        let pivot = a[[j, j]] - row_j.dot(&row_j);
        if !(pivot > 0.0) {
            return Err(SparseRecError::Numerical(format!(
                "normal equations are not positive definite (pivot {} = {})",
                j, pivot
            )));
        }
        let l_jj = pivot.sqrt();
        a[[j, j]] = l_jj;

        for i in (j + 1)..n {
            let overlap = a.slice(s![i, ..j]).dot(&a.slice(s![j, ..j]));
            a[[i, j]] = (a[[i, j]] - overlap) / l_jj;
        }
    }

    // L y = b
    for i in 0..n {
        let partial = a.slice(s![i, ..i]).dot(&b.slice(s![..i]));
        b[i] = (b[i] - partial) / a[[i, i]];
    }
    // L^T x = y
    for i in (0..n).rev() {
        let partial = a.slice(s![(i + 1).., i]).dot(&b.slice(s![(i + 1)..]));
        b[i] = (b[i] - partial) / a[[i, i]];
    }
    Ok(())
}
