mod als_test;

use sparserec_core::CsrMatrix;

/// 5 users × 5 items, 10 interactions
pub(crate) fn five_by_five() -> CsrMatrix {
    CsrMatrix::from_triplets(
        5,
        5,
        &[
            (0, 0, 1.0),
            (0, 2, 3.0),
            (1, 1, 2.0),
            (1, 4, 1.0),
            (2, 0, 1.0),
            (2, 3, 4.0),
            (3, 2, 1.0),
            (3, 4, 2.0),
            (4, 1, 5.0),
            (4, 3, 1.0),
        ],
    )
    .unwrap()
}
