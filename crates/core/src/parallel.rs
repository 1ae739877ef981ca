//! Row-block fan-out over a per-call worker pool
//!
//! Rows `0..n_rows` are cut into `n_threads` contiguous blocks. The first
//! `n_rows % n_threads` blocks get one extra row. Each block runs as one task on
//! a pool that lives exactly as long as the call; results come back in block
//! order regardless of completion order.

use crate::error::{Result, SparseRecError};
use rayon::prelude::*;
use std::ops::Range;

/// Contiguous row ranges covering `0..n_rows`, one per thread
pub fn row_blocks(n_rows: usize, n_threads: usize) -> Result<Vec<Range<usize>>> {
    if n_threads == 0 {
        return Err(SparseRecError::invalid_argument(
            "n_threads",
            "must be greater than 0",
        ));
    }

    let rows_per_block = n_rows / n_threads;
    let remainder = n_rows % n_threads;
    let mut blocks = Vec::with_capacity(n_threads);
    let mut start = 0;
    for i in 0..n_threads {
        let size = rows_per_block + usize::from(i < remainder);
        blocks.push(start..start + size);
        start += size;
    }
    Ok(blocks)
}

/// Run `task` on every row block and collect the block results in row order
///
/// All blocks run to completion before anything is returned. If any block
/// fails, the error of the first failing block (in row order) is returned and
/// the other results are dropped.
pub fn run_row_blocks<T, F>(n_rows: usize, n_threads: usize, task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> Result<T> + Sync,
{
    let blocks = row_blocks(n_rows, n_threads)?;

    let outcomes: Vec<Result<T>> = if n_threads == 1 {
        blocks.into_iter().map(&task).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("sparserec-block-{}", i))
            .build()
            .map_err(|e| SparseRecError::ThreadPool(e.to_string()))?;

        tracing::trace!(n_rows, n_threads, "dispatching row blocks");
        pool.install(|| {
            blocks
                .into_par_iter()
                .with_max_len(1)
                .map(|block| task(block))
                .collect()
        })
    };

    outcomes.into_iter().collect()
}
