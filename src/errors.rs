use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, AquahashError>;

#[derive(ThisError, Debug)]
pub enum AquahashError {
    #[error("invalid size {size}: expected a positive multiple of {unit} bytes")]
    InvalidSize { size: usize, unit: usize },

    #[error("failed to reserve {size} bytes")]
    AllocationFailure {
        size: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("dataset generation cancelled at {percent}%")]
    Cancelled { percent: u32 },

    #[error("{context} {path:?}")]
    IoFailure {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset file {path:?} is not reusable: {reason}")]
    FormatMismatch { path: PathBuf, reason: String },

    #[error("failed to build the dataset worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to load config")]
    Config(#[from] ::config::ConfigError),
}

impl AquahashError {
    pub(crate) fn io(
        context: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::IoFailure {
            context,
            path,
            source,
        }
    }
}
