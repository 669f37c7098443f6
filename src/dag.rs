use std::fmt;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use ethereum_types::H256;
use thiserror::Error as ThisError;

use crate::config::AquahashConfig;
use crate::errors::{AquahashError, Result};
use crate::io::{self, Prepared};
use crate::{dataset, ProofResult, MIX_BYTES};

/// Cache of one epoch, enough to verify proofs by recomputing the dataset
/// nodes they touch.
pub struct LightDAG {
    epoch: u64,
    block_number: u64,
    seed: H256,
    cache: Vec<u8>,
    full_size: usize,
}

impl LightDAG {
    pub fn new(block_number: u64) -> Result<Self> {
        Self::with_sizes(
            block_number,
            crate::get_cache_size(block_number),
            crate::get_full_size(block_number),
        )
    }

    /// Build a handle with explicit cache and dataset sizes instead of the
    /// ones derived from `block_number`. The seed still comes from the block
    /// number.
    pub fn with_sizes(block_number: u64, cache_size: usize, full_size: usize) -> Result<Self> {
        crate::check_size(full_size, MIX_BYTES)?;
        let seed = crate::get_seedhash(block_number);
        let cache = crate::build_cache(cache_size, seed)?;

        Ok(Self {
            epoch: crate::epoch(block_number),
            block_number,
            seed,
            cache,
            full_size,
        })
    }

    pub fn compute(&self, header_hash: H256, nonce: u64) -> ProofResult {
        crate::hashimoto_light(header_hash, nonce, self.full_size, &self.cache)
    }

    pub fn is_valid_for(&self, block_number: u64) -> bool {
        crate::epoch(block_number) == self.epoch
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn seed(&self) -> H256 {
        self.seed
    }

    pub fn cache(&self) -> &[u8] {
        &self.cache
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn full_size(&self) -> usize {
        self.full_size
    }
}

impl fmt::Debug for LightDAG {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightDAG")
            .field("epoch", &self.epoch)
            .field("block_number", &self.block_number)
            .field("seed", &self.seed)
            .field("cache_size", &self.cache.len())
            .field("full_size", &self.full_size)
            .finish()
    }
}

/// Failure to build a [`FullDAG`]. Hands back the light handle that was
/// passed in.
#[derive(ThisError, Debug)]
#[error("failed to build the full dataset")]
pub struct FullDAGError {
    light: LightDAG,
    #[source]
    source: AquahashError,
}

impl FullDAGError {
    pub fn into_light(self) -> LightDAG {
        self.light
    }

    pub fn error(&self) -> &AquahashError {
        &self.source
    }

    pub fn into_parts(self) -> (LightDAG, AquahashError) {
        (self.light, self.source)
    }
}

/// Whole dataset of one epoch, resident in memory and memoized on disk.
pub struct FullDAG {
    light: LightDAG,
    dataset: Vec<u8>,
    path: PathBuf,
    // held for the lifetime of the handle
    #[allow(dead_code)]
    file: File,
}

impl FullDAG {
    /// Load the dataset from the default directory, or generate it there.
    /// `progress` gets the completed percentage during generation and stops
    /// it by returning [`ControlFlow::Break`].
    pub fn new<P>(light: LightDAG, progress: P) -> std::result::Result<Self, FullDAGError>
    where
        P: FnMut(u32) -> ControlFlow<()>,
    {
        Self::with_config(light, &AquahashConfig::default(), progress)
    }

    pub fn with_config<P>(
        light: LightDAG,
        config: &AquahashConfig,
        progress: P,
    ) -> std::result::Result<Self, FullDAGError>
    where
        P: FnMut(u32) -> ControlFlow<()>,
    {
        match load_or_generate(&light, config, progress) {
            Ok((file, path, dataset)) => Ok(Self {
                light,
                dataset,
                path,
                file,
            }),
            Err(source) => Err(FullDAGError { light, source }),
        }
    }

    pub fn compute(&self, header_hash: H256, nonce: u64) -> ProofResult {
        crate::hashimoto_full(header_hash, nonce, &self.dataset)
    }

    pub fn dag(&self) -> &[u8] {
        &self.dataset
    }

    pub fn dag_size(&self) -> u64 {
        self.dataset.len() as u64
    }

    pub fn light(&self) -> &LightDAG {
        &self.light
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_light(self) -> LightDAG {
        self.light
    }
}

impl fmt::Debug for FullDAG {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullDAG")
            .field("light", &self.light)
            .field("path", &self.path)
            .field("dag_size", &self.dataset.len())
            .finish()
    }
}

fn load_or_generate<P>(
    light: &LightDAG,
    config: &AquahashConfig,
    progress: P,
) -> Result<(File, PathBuf, Vec<u8>)>
where
    P: FnMut(u32) -> ControlFlow<()>,
{
    let dir = config.dag_dir.as_path();
    let full_size = light.full_size;
    let path = io::dag_path(dir, &light.seed);

    let mut prepared = io::prepare(dir, &light.seed, full_size, false)?;
    if let Prepared::SizeMismatch = prepared {
        log::warn!("dataset file {path:?} is stale, regenerating it");
        prepared = io::prepare(dir, &light.seed, full_size, true)?;
    }

    match prepared {
        Prepared::Reuse(mut file) => {
            log::info!("loading dataset for epoch {} from {path:?}", light.epoch);
            let dataset = io::read_dataset(&mut file, &path, full_size)?;
            Ok((file, path, dataset))
        }
        Prepared::Create(mut file) => {
            let generated = dataset::build_dataset(&light.cache, full_size, config.worker_threads(), progress)
                .and_then(|dataset| io::write_dataset(&mut file, &path, &dataset).map(|_| dataset));
            match generated {
                Ok(dataset) => {
                    log::info!("dataset for epoch {} stored at {path:?}", light.epoch);
                    Ok((file, path, dataset))
                }
                Err(e) => {
                    drop(file);
                    io::discard(&path, full_size);
                    Err(e)
                }
            }
        }
        Prepared::SizeMismatch => Err(AquahashError::FormatMismatch {
            path,
            reason: "recreated file does not match the expected size".to_string(),
        }),
    }
}
