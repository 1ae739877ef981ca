//! End-to-end runs: split, weight, train, score and evaluate
//!
//! Debug logging is switched on so the traced code paths run too.

use anyhow::Result;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sparserec_core::{
    init_logging, okapi_bm25_weight, parallel_sparse_product, train_test_split_rowwise,
    CsrMatrix, LogConfig,
};
use sparserec_engine::{
    ALSTrainer, CosineSimilarityComputer, Evaluator, LearningConfig, Metrics, P3alphaComputer,
    Recommendable, SimilarityComputer,
};

/// Two user communities, each interacting mostly with its own half of the items
fn clustered(seed: u64, users: usize, items: usize) -> Result<CsrMatrix> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut triplets = Vec::new();
    for user in 0..users {
        let home = user % 2;
        for item in 0..items {
            let p = if item % 2 == home { 0.5 } else { 0.05 };
            if rng.gen_bool(p) {
                triplets.push((user, item, 1.0));
            }
        }
    }
    Ok(CsrMatrix::from_triplets(users, items, &triplets)?)
}

fn assert_bounded(metrics: &Metrics) {
    for (name, value) in metrics.entries() {
        assert!(value.is_finite(), "{} = {}", name, value);
    }
    for value in [
        metrics.hit,
        metrics.recall,
        metrics.ndcg,
        metrics.map,
        metrics.precision,
        metrics.gini_index,
    ] {
        assert!((0.0..=1.0).contains(&value));
    }
}

#[test]
fn test_als_beats_constant_scorer_on_clustered_data() -> Result<()> {
    let _ = init_logging(&LogConfig {
        level: "debug".to_string(),
        ..LogConfig::default()
    });

    let x = clustered(17, 60, 40)?;
    let (train, test) = train_test_split_rowwise(&x, 0.3, 3)?;

    let config = LearningConfig::builder()
        .set_k(4)
        .set_alpha(5.0)
        .set_reg(0.1)
        .set_n_threads(3)
        .build()?;
    let mut trainer = ALSTrainer::new(config, &train)?;
    trainer.fit(8)?;

    let mut scores = trainer.user_factors().dot(&trainer.item_factors().t());
    // already-seen items cannot be recommended again
    for user in 0..train.n_rows() {
        for &item in train.row(user).0 {
            scores[[user, item]] = f64::NEG_INFINITY;
        }
    }

    let evaluator = Evaluator::new(&test, 10, Recommendable::All, 2)?;
    let metrics = evaluator.get_score(scores.view())?;
    assert!(metrics.n_users > 0);
    assert_bounded(&metrics);

    // a constant scorer ranks by item index only
    let flat = Array2::<f64>::zeros(test.shape());
    let baseline = evaluator.get_score(flat.view())?;
    assert!(metrics.recall > baseline.recall);
    Ok(())
}

#[test]
fn test_item_knn_scores_through_sparse_product() -> Result<()> {
    let x = clustered(23, 40, 30)?;
    let (train, test) = train_test_split_rowwise(&x, 0.25, 9)?;
    let weighted = okapi_bm25_weight(&train, 1.2, 0.75)?;

    // items are the rows of the transposed matrix
    let item_similarity = CosineSimilarityComputer::new(&weighted.transpose(), 1.0, false, 2)?
        .with_top_k(10)?
        .compute_similarity()?;
    let scores = parallel_sparse_product(&train, &item_similarity, 4)?;
    assert_eq!(scores.shape(), train.shape());

    let walk = P3alphaComputer::new(&train.transpose(), 0.7, true, 2)?.compute_w()?;
    let walk_scores = parallel_sparse_product(&train, &walk, 1)?;

    let items: Vec<usize> = (0..train.n_cols()).step_by(2).collect();
    let evaluator = Evaluator::new(&test, 5, Recommendable::Global(items), 3)?;
    let table = evaluator.get_scores(scores.to_dense().view(), &[1, 5])?;
    assert_eq!(table.len(), 16);
    assert!(table["hit@5"] >= table["hit@1"]);

    let walk_metrics = evaluator.get_score(walk_scores.to_dense().view())?;
    assert_bounded(&walk_metrics);
    Ok(())
}
