//! Learning configuration for implicit ALS
//!
//! [`LearningConfig`] is an immutable, validated value. Use
//! [`LearningConfigBuilder`] to accumulate settings before validation, or
//! [`ConfigLoader::from_env`] to read them from the environment.

use sparserec_core::config::{parse_env_var, ConfigLoader};
use sparserec_core::{PersistentState, Result, SparseRecError, StateValue};

const DEFAULT_K: usize = 16;
const DEFAULT_ALPHA: f64 = 0.0;
const DEFAULT_REG: f64 = 1e-3;
const DEFAULT_INIT_STDEV: f64 = 0.01;
const DEFAULT_N_THREADS: usize = 1;
const DEFAULT_RANDOM_SEED: u64 = 42;

/// ALS hyper-parameters
///
/// Invariants: `k > 0`, `alpha >= 0`, `reg > 0`, `init_stdev >= 0`, `n_threads >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningConfig {
    k: usize,
    alpha: f64,
    reg: f64,
    init_stdev: f64,
    n_threads: usize,
    random_seed: u64,
}

impl LearningConfig {
    pub fn new(
        k: usize,
        alpha: f64,
        reg: f64,
        init_stdev: f64,
        n_threads: usize,
        random_seed: u64,
    ) -> Result<Self> {
        let config = Self {
            k,
            alpha,
            reg,
            init_stdev,
            n_threads,
            random_seed,
        };
        config.check()?;
        Ok(config)
    }

    pub fn builder() -> LearningConfigBuilder {
        LearningConfigBuilder::default()
    }

    /// Latent dimension
    pub fn k(&self) -> usize {
        self.k
    }

    /// Confidence scaling: an observed value `r` gets confidence `1 + alpha * r`
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// L2 regularization added to every normal-equation diagonal
    pub fn reg(&self) -> f64 {
        self.reg
    }

    pub fn init_stdev(&self) -> f64 {
        self.init_stdev
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    fn check(&self) -> Result<()> {
        if self.k == 0 {
            return Err(SparseRecError::invalid_argument("K", "must be greater than 0"));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(SparseRecError::invalid_argument(
                "alpha",
                format!("must be a non-negative number, got {}", self.alpha),
            ));
        }
        if !(self.reg.is_finite() && self.reg > 0.0) {
            return Err(SparseRecError::invalid_argument(
                "reg",
                format!("must be positive, got {}", self.reg),
            ));
        }
        if !(self.init_stdev.is_finite() && self.init_stdev >= 0.0) {
            return Err(SparseRecError::invalid_argument(
                "init_stdev",
                format!("must be a non-negative number, got {}", self.init_stdev),
            ));
        }
        if self.n_threads == 0 {
            return Err(SparseRecError::invalid_argument(
                "n_threads",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            reg: DEFAULT_REG,
            init_stdev: DEFAULT_INIT_STDEV,
            n_threads: DEFAULT_N_THREADS,
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

/// Accumulates [`LearningConfig`] fields; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct LearningConfigBuilder {
    k: usize,
    alpha: f64,
    reg: f64,
    init_stdev: f64,
    n_threads: usize,
    random_seed: u64,
}

impl Default for LearningConfigBuilder {
    fn default() -> Self {
        let defaults = LearningConfig::default();
        Self {
            k: defaults.k,
            alpha: defaults.alpha,
            reg: defaults.reg,
            init_stdev: defaults.init_stdev,
            n_threads: defaults.n_threads,
            random_seed: defaults.random_seed,
        }
    }
}

impl LearningConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn set_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn set_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn set_init_stdev(mut self, init_stdev: f64) -> Self {
        self.init_stdev = init_stdev;
        self
    }

    pub fn set_n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn set_random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn build(&self) -> Result<LearningConfig> {
        LearningConfig::new(
            self.k,
            self.alpha,
            self.reg,
            self.init_stdev,
            self.n_threads,
            self.random_seed,
        )
    }
}

/// # Environment Variables
///
/// - `SPARSEREC_ALS_K` (default: 16)
/// - `SPARSEREC_ALS_ALPHA` (default: 0)
/// - `SPARSEREC_ALS_REG` (default: 0.001)
/// - `SPARSEREC_ALS_INIT_STDEV` (default: 0.01)
/// - `SPARSEREC_ALS_N_THREADS` (default: 1)
/// - `SPARSEREC_ALS_RANDOM_SEED` (default: 42)
impl ConfigLoader for LearningConfig {
    fn from_env() -> Result<Self> {
        LearningConfigBuilder::new()
            .set_k(parse_env_var("SPARSEREC_ALS_K", DEFAULT_K)?)
            .set_alpha(parse_env_var("SPARSEREC_ALS_ALPHA", DEFAULT_ALPHA)?)
            .set_reg(parse_env_var("SPARSEREC_ALS_REG", DEFAULT_REG)?)
            .set_init_stdev(parse_env_var("SPARSEREC_ALS_INIT_STDEV", DEFAULT_INIT_STDEV)?)
            .set_n_threads(parse_env_var("SPARSEREC_ALS_N_THREADS", DEFAULT_N_THREADS)?)
            .set_random_seed(parse_env_var(
                "SPARSEREC_ALS_RANDOM_SEED",
                DEFAULT_RANDOM_SEED,
            )?)
            .build()
    }

    fn validate(&self) -> Result<()> {
        self.check()
    }
}

/// State layout: `(K, alpha, reg, init_stdev, n_threads, random_seed)`
impl PersistentState for LearningConfig {
    fn to_state(&self) -> StateValue {
        StateValue::Tuple(vec![
            StateValue::UInt(self.k as u64),
            StateValue::Real(self.alpha),
            StateValue::Real(self.reg),
            StateValue::Real(self.init_stdev),
            StateValue::UInt(self.n_threads as u64),
            StateValue::UInt(self.random_seed),
        ])
    }

    fn from_state(state: &StateValue) -> Result<Self> {
        let fields = state.expect_tuple(6, "LearningConfig")?;
        LearningConfig::new(
            fields[0].as_usize("K")?,
            fields[1].as_f64("alpha")?,
            fields[2].as_f64("reg")?,
            fields[3].as_f64("init_stdev")?,
            fields[4].as_usize("n_threads")?,
            fields[5].as_u64("random_seed")?,
        )
    }
}
