//! Ranking evaluation against held-out interactions
//!
//! Every user with at least one relevant (and recommendable) item is ranked
//! independently; ranking fans out over row blocks. Metrics are averaged over
//! the evaluated users, except for the catalogue-level ones (`appeared_item`,
//! `entropy`, `gini_index`) which are computed over all recommended lists.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use sparserec_core::observability::operation_span;
use sparserec_core::{run_row_blocks, CsrMatrix, Result, SparseRecError};
use std::collections::BTreeMap;
use tracing::debug;

/// Items a user may be recommended
#[derive(Debug, Clone, PartialEq)]
pub enum Recommendable {
    All,
    /// Same subset for every user
    Global(Vec<usize>),
    /// One subset per ground-truth row
    ///
    /// The list count must equal the number of users. A single shared list is
    /// expressed as [`Recommendable::Global`].
    PerUser(Vec<Vec<usize>>),
}

impl Recommendable {
    fn candidates(&self, user: usize) -> Option<&[usize]> {
        match self {
            Recommendable::All => None,
            Recommendable::Global(items) => Some(items.as_slice()),
            Recommendable::PerUser(lists) => Some(lists[user].as_slice()),
        }
    }
}

/// Averaged ranking metrics at one cutoff
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub hit: f64,
    pub recall: f64,
    pub ndcg: f64,
    pub map: f64,
    pub precision: f64,
    pub appeared_item: f64,
    pub entropy: f64,
    pub gini_index: f64,
    /// Users that had at least one relevant item
    pub n_users: usize,
}

impl Metrics {
    /// Metric values keyed by name
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("hit", self.hit),
            ("recall", self.recall),
            ("ndcg", self.ndcg),
            ("map", self.map),
            ("precision", self.precision),
            ("appeared_item", self.appeared_item),
            ("entropy", self.entropy),
            ("gini_index", self.gini_index),
        ]
    }
}

/// One evaluated user's top list and which ranks were relevant
#[derive(Debug)]
struct Ranking {
    items: Vec<usize>,
    relevant: Vec<bool>,
    n_relevant: usize,
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    ground_truth: CsrMatrix,
    cutoff: usize,
    recommendable: Recommendable,
    n_threads: usize,
}

impl Evaluator {
    pub fn new(
        ground_truth: &CsrMatrix,
        cutoff: usize,
        recommendable: Recommendable,
        n_threads: usize,
    ) -> Result<Self> {
        check_cutoff(cutoff)?;
        if n_threads == 0 {
            return Err(SparseRecError::invalid_argument(
                "n_threads",
                "must be greater than 0",
            ));
        }

        let n_items = ground_truth.n_cols();
        let recommendable = match recommendable {
            Recommendable::All => Recommendable::All,
            Recommendable::Global(items) => Recommendable::Global(sorted_subset(items, n_items)?),
            Recommendable::PerUser(lists) => {
                if lists.len() != ground_truth.n_rows() {
                    return Err(SparseRecError::invalid_argument(
                        "recommendable",
                        format!(
                            "got {} per-user lists for {} users",
                            lists.len(),
                            ground_truth.n_rows()
                        ),
                    ));
                }
                Recommendable::PerUser(
                    lists
                        .into_iter()
                        .map(|items| sorted_subset(items, n_items))
                        .collect::<Result<_>>()?,
                )
            }
        };

        Ok(Self {
            ground_truth: ground_truth.clone(),
            cutoff,
            recommendable,
            n_threads,
        })
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Metrics at the configured cutoff
    pub fn get_score(&self, scores: ArrayView2<f64>) -> Result<Metrics> {
        let rankings = self.rank(scores, self.cutoff)?;
        Ok(self.summarize(&rankings, self.cutoff))
    }

    /// Metrics at several cutoffs, keyed `"{metric}@{cutoff}"`
    pub fn get_scores(
        &self,
        scores: ArrayView2<f64>,
        cutoffs: &[usize],
    ) -> Result<BTreeMap<String, f64>> {
        for &cutoff in cutoffs {
            check_cutoff(cutoff)?;
        }
        let deepest = match cutoffs.iter().max() {
            Some(&deepest) => deepest,
            None => return Ok(BTreeMap::new()),
        };

        let rankings = self.rank(scores, deepest)?;
        let mut result = BTreeMap::new();
        for &cutoff in cutoffs {
            let metrics = self.summarize(&rankings, cutoff);
            for (name, value) in metrics.entries() {
                result.insert(format!("{}@{}", name, cutoff), value);
            }
        }
        Ok(result)
    }

    /// Top-`depth` rankings of every user with a relevant recommendable item
    fn rank(&self, scores: ArrayView2<f64>, depth: usize) -> Result<Vec<Ranking>> {
        if scores.dim() != self.ground_truth.shape() {
            return Err(SparseRecError::dimension_mismatch(format!(
                "scores have shape {:?} but the ground truth is {:?}",
                scores.dim(),
                self.ground_truth.shape()
            )));
        }

        let n_users = self.ground_truth.n_rows();
        let n_items = self.ground_truth.n_cols();
        let _span = operation_span("evaluate", n_users, self.n_threads).entered();

        let blocks = run_row_blocks(n_users, self.n_threads, |range| {
            let mut block = Vec::new();
            for user in range {
                let candidates = self.recommendable.candidates(user);
                let (truth, _) = self.ground_truth.row(user);
                let is_relevant = |item: usize| truth.binary_search(&item).is_ok();
                let n_relevant = match candidates {
                    None => truth.len(),
                    Some(items) => items.iter().filter(|&&item| is_relevant(item)).count(),
                };
                if n_relevant == 0 {
                    continue;
                }

                let mut items: Vec<usize> = match candidates {
                    None => (0..n_items).collect(),
                    Some(items) => items.to_vec(),
                };
                let row = scores.row(user);
                // stable: equal scores keep ascending item order
                items.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
                items.truncate(depth);

                let relevant = items.iter().map(|&item| is_relevant(item)).collect();
                block.push(Ranking {
                    items,
                    relevant,
                    n_relevant,
                });
            }
            Ok(block)
        })?;

        let rankings: Vec<Ranking> = blocks.into_iter().flatten().collect();
        debug!(
            users = n_users,
            evaluated = rankings.len(),
            depth,
            "rankings computed"
        );
        Ok(rankings)
    }

    fn summarize(&self, rankings: &[Ranking], cutoff: usize) -> Metrics {
        let n_items = self.ground_truth.n_cols();
        let mut metrics = Metrics::default();
        let mut frequency = vec![0usize; n_items];

        for ranking in rankings {
            let depth = cutoff.min(ranking.items.len());
            let ideal = cutoff.min(ranking.n_relevant);

            let mut hits = 0usize;
            let mut dcg = 0.0;
            let mut average_precision = 0.0;
            for rank in 0..depth {
                frequency[ranking.items[rank]] += 1;
                if ranking.relevant[rank] {
                    hits += 1;
                    dcg += discount(rank);
                    average_precision += hits as f64 / (rank + 1) as f64;
                }
            }
            let ideal_dcg: f64 = (0..ideal).map(discount).sum();

            metrics.hit += if hits > 0 { 1.0 } else { 0.0 };
            metrics.recall += hits as f64 / ideal as f64;
            metrics.ndcg += dcg / ideal_dcg;
            metrics.map += average_precision / ideal as f64;
            metrics.precision += hits as f64 / cutoff as f64;
        }

        metrics.n_users = rankings.len();
        if metrics.n_users > 0 {
            let n = metrics.n_users as f64;
            metrics.hit /= n;
            metrics.recall /= n;
            metrics.ndcg /= n;
            metrics.map /= n;
            metrics.precision /= n;
        }

        metrics.appeared_item = frequency.iter().filter(|&&f| f > 0).count() as f64;
        metrics.entropy = entropy(&frequency);
        metrics.gini_index = gini_index(&mut frequency);
        metrics
    }
}

fn check_cutoff(cutoff: usize) -> Result<()> {
    if cutoff == 0 {
        return Err(SparseRecError::invalid_argument(
            "cutoff",
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Sort and validate a recommendable subset
fn sorted_subset(mut items: Vec<usize>, n_items: usize) -> Result<Vec<usize>> {
    if let Some(&bad) = items.iter().find(|&&item| item >= n_items) {
        return Err(SparseRecError::invalid_argument(
            "recommendable",
            format!("item {} is outside the {} items", bad, n_items),
        ));
    }
    items.sort_unstable();
    if let Some(pair) = items.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(SparseRecError::invalid_argument(
            "recommendable",
            format!("item {} is listed twice", pair[0]),
        ));
    }
    Ok(items)
}

fn discount(rank: usize) -> f64 {
    1.0 / ((rank + 2) as f64).log2()
}

fn entropy(frequency: &[usize]) -> f64 {
    let total: usize = frequency.iter().sum();
    if total == 0 {
        return 0.0;
    }
    frequency
        .iter()
        .filter(|&&f| f > 0)
        .map(|&f| {
            let p = f as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

/// Gini coefficient of the item frequencies (0 = perfectly even)
fn gini_index(frequency: &mut [usize]) -> f64 {
    let total: usize = frequency.iter().sum();
    let n = frequency.len();
    if total == 0 || n == 0 {
        return 0.0;
    }
    frequency.sort_unstable();
    let weighted: f64 = frequency
        .iter()
        .enumerate()
        .map(|(i, &f)| (2.0 * (i + 1) as f64 - n as f64 - 1.0) * f as f64)
        .sum();
    weighted / (n as f64 * total as f64)
}
