//! ALS trainer behaviour tests

use super::five_by_five;
use crate::als::ALSTrainer;
use crate::learning_config::LearningConfig;
use ndarray::Array2;
use sparserec_core::{CsrMatrix, SparseRecError};

fn config(k: usize, alpha: f64, reg: f64, n_threads: usize) -> LearningConfig {
    LearningConfig::builder()
        .set_k(k)
        .set_alpha(alpha)
        .set_reg(reg)
        .set_init_stdev(0.1)
        .set_n_threads(n_threads)
        .set_random_seed(42)
        .build()
        .unwrap()
}

#[test]
fn test_objective_never_increases() {
    let x = five_by_five();
    for alpha in [0.0, 2.0] {
        let mut trainer = ALSTrainer::new(config(2, alpha, 0.01, 1), &x).unwrap();
        let mut previous = trainer.objective().unwrap();
        for _ in 0..10 {
            trainer.step().unwrap();
            let current = trainer.objective().unwrap();
            assert!(
                current <= previous + 1e-9 * previous.abs().max(1.0),
                "objective rose from {} to {}",
                previous,
                current
            );
            previous = current;
        }
    }
}

#[test]
fn test_initialization_is_seeded() {
    let x = five_by_five();
    let first = ALSTrainer::new(config(3, 1.0, 0.1, 1), &x).unwrap();
    let second = ALSTrainer::new(config(3, 1.0, 0.1, 1), &x).unwrap();
    assert_eq!(first.user_factors(), second.user_factors());
    assert_eq!(first.item_factors(), second.item_factors());
    assert_eq!(first.user_factors().dim(), (5, 3));
}

#[test]
fn test_thread_count_does_not_change_result() {
    let x = five_by_five();
    let mut single = ALSTrainer::new(config(3, 1.0, 0.1, 1), &x).unwrap();
    let mut pooled = ALSTrainer::new(config(3, 1.0, 0.1, 3), &x).unwrap();
    single.fit(5).unwrap();
    pooled.fit(5).unwrap();
    assert_eq!(single.user_factors(), pooled.user_factors());
    assert_eq!(single.item_factors(), pooled.item_factors());
}

#[test]
fn test_fold_in_empty_row_is_zero() {
    let x = five_by_five();
    let mut trainer = ALSTrainer::new(config(2, 1.0, 0.1, 1), &x).unwrap();
    trainer.fit(3).unwrap();

    let empty = CsrMatrix::zeros(2, 5);
    let folded = trainer.transform_user(&empty).unwrap();
    assert_eq!(folded, Array2::<f64>::zeros((2, 2)));
}

#[test]
fn test_fold_in_shrinks_with_regularization() {
    let x = five_by_five();
    let mut trainer = ALSTrainer::new(config(3, 1.0, 0.01, 1), &x).unwrap();
    trainer.fit(5).unwrap();
    let user = trainer.user_factors().to_owned();
    let item = trainer.item_factors().to_owned();

    let row = CsrMatrix::from_triplets(1, 5, &[(0, 0, 1.0), (0, 3, 2.0)]).unwrap();
    let mut norms = Vec::new();
    for reg in [0.01, 0.1, 1.0, 10.0, 100.0] {
        let model =
            ALSTrainer::from_factors(config(3, 1.0, reg, 1), user.clone(), item.clone()).unwrap();
        let folded = model.transform_user(&row).unwrap();
        let norm = folded.iter().map(|v| v * v).sum::<f64>().sqrt();
        norms.push(norm);
    }
    for pair in norms.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "norms {:?}", norms);
    }
    assert!(norms[4] < norms[0]);
}

#[test]
fn test_transform_item_shape() {
    let x = five_by_five();
    let mut trainer = ALSTrainer::new(config(2, 1.0, 0.1, 1), &x).unwrap();
    trainer.fit(2).unwrap();
    let folded = trainer.transform_item(&x.transpose()).unwrap();
    assert_eq!(folded.dim(), (5, 2));
    assert!(folded.iter().all(|v| v.is_finite()));
}

#[test]
fn test_restored_trainer_needs_interactions() {
    let x = five_by_five();
    let trained = ALSTrainer::new(config(2, 0.0, 0.1, 1), &x).unwrap();
    let mut restored = ALSTrainer::from_factors(
        *trained.config(),
        trained.user_factors().to_owned(),
        trained.item_factors().to_owned(),
    )
    .unwrap();

    assert!(matches!(
        restored.step(),
        Err(SparseRecError::InvalidArgument { .. })
    ));
    assert!(restored.objective().is_err());

    let wrong_shape = CsrMatrix::zeros(4, 5);
    assert!(restored.attach_interactions(&wrong_shape).is_err());
    restored.attach_interactions(&x).unwrap();
    restored.step().unwrap();
}

#[test]
fn test_setters_validate_shapes() {
    let x = five_by_five();
    let mut trainer = ALSTrainer::new(config(2, 0.0, 0.1, 1), &x).unwrap();

    assert!(matches!(
        trainer.set_user_factors(Array2::zeros((5, 3))),
        Err(SparseRecError::DimensionMismatch { .. })
    ));
    assert!(trainer.set_item_factors(Array2::zeros((4, 2))).is_err());
    trainer.set_user_factors(Array2::ones((5, 2))).unwrap();
    assert_eq!(trainer.user_factors(), Array2::<f64>::ones((5, 2)));

    assert!(ALSTrainer::from_factors(
        *trainer.config(),
        Array2::zeros((5, 1)),
        Array2::zeros((5, 2))
    )
    .is_err());
}

#[test]
fn test_scores_and_fold_in_errors() {
    let x = five_by_five();
    let trainer = ALSTrainer::new(config(2, 0.0, 0.1, 1), &x).unwrap();

    assert_eq!(trainer.user_scores(4).unwrap().len(), 5);
    assert!(matches!(
        trainer.user_scores(5),
        Err(SparseRecError::OutOfRange { index: 5, len: 5 })
    ));

    let wrong = CsrMatrix::zeros(1, 6);
    assert!(trainer.transform_user(&wrong).is_err());
    assert!(trainer.transform_item(&wrong).is_err());
}

#[test]
fn test_negative_interactions_rejected() {
    let signed = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, -3.0)]).unwrap();
    assert!(matches!(
        ALSTrainer::new(config(2, 1.0, 0.1, 1), &signed),
        Err(SparseRecError::InvalidArgument { .. })
    ));

    let x = five_by_five();
    let mut trainer = ALSTrainer::new(config(2, 1.0, 0.1, 1), &x).unwrap();
    let negative_row = CsrMatrix::from_triplets(1, 5, &[(0, 2, -1.0)]).unwrap();
    assert!(trainer.transform_user(&negative_row).is_err());
    assert!(trainer.transform_item(&negative_row).is_err());

    let flipped = x.map_values(|_, _, v| -v);
    assert!(trainer.attach_interactions(&flipped).is_err());
}
