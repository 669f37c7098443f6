//! Full dataset generation.
//!
//! The index range is cut into chunks of `total / PROGRESS_STEPS` items (at
//! least one). Items of a chunk are derived in parallel on a rayon pool, each
//! worker writing its own disjoint 64-byte slice of the output buffer.
//! Between chunks the coordinating thread reports progress and checks whether
//! the caller asked to stop.

use std::ops::ControlFlow;

use rayon::prelude::*;

use crate::errors::{AquahashError, Result};
use crate::{allocate, calc_dataset_item, check_size, HASH_BYTES, MIX_BYTES};

/// Target number of progress reports during one dataset generation.
pub const PROGRESS_STEPS: usize = 100;

/// Fill `dataset` with nodes derived from `cache`.
///
/// `progress` receives the completed percentage after every chunk; returning
/// [`ControlFlow::Break`] stops generation with [`AquahashError::Cancelled`]
/// and leaves `dataset` partially written.
pub fn make_dataset<P>(dataset: &mut [u8], cache: &[u8], threads: usize, mut progress: P) -> Result<()>
where
    P: FnMut(u32) -> ControlFlow<()>,
{
    check_size(cache.len(), HASH_BYTES)?;
    check_size(dataset.len(), MIX_BYTES)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("aquahash-dag-{i}"))
        .build()?;

    let total = dataset.len() / HASH_BYTES;
    let chunk_items = (total / PROGRESS_STEPS).max(1);
    let mut completed = 0usize;

    for chunk in dataset.chunks_mut(chunk_items * HASH_BYTES) {
        let base = completed;
        pool.install(|| {
            chunk
                .par_chunks_mut(HASH_BYTES)
                .enumerate()
                .for_each(|(k, node)| node.copy_from_slice(calc_dataset_item(cache, base + k).as_bytes()))
        });

        completed += chunk.len() / HASH_BYTES;
        let percent = (completed * 100 / total) as u32;
        if progress(percent).is_break() {
            log::warn!("dataset generation cancelled at {percent}%");
            return Err(AquahashError::Cancelled { percent });
        }
    }

    Ok(())
}

/// Allocate a `full_size` buffer and fill it with [`make_dataset`]. On
/// cancellation the partial buffer is dropped.
pub fn build_dataset<P>(cache: &[u8], full_size: usize, threads: usize, progress: P) -> Result<Vec<u8>>
where
    P: FnMut(u32) -> ControlFlow<()>,
{
    check_size(full_size, MIX_BYTES)?;
    let mut dataset = allocate(full_size)?;

    log::info!(
        "generating {} MB dataset on {threads} threads",
        full_size / (1024 * 1024)
    );
    let started = std::time::Instant::now();
    make_dataset(&mut dataset, cache, threads, progress)?;
    log::info!("dataset generated in {:?}", started.elapsed());

    Ok(dataset)
}
