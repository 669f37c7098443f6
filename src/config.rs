use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AquahashConfig {
    /// Directory holding memoized dataset files.
    #[serde(default = "default_dag_dir")]
    pub dag_dir: PathBuf,

    /// Dataset generation workers, all logical cores when unset.
    #[serde(default)]
    pub threads: Option<usize>,

    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl AquahashConfig {
    pub fn worker_threads(&self) -> usize {
        match self.threads {
            Some(threads) if threads > 0 => threads,
            _ => num_cpus::get(),
        }
    }
}

impl Default for AquahashConfig {
    fn default() -> Self {
        Self {
            dag_dir: default_dag_dir(),
            threads: None,
            log_level: LogLevel::default(),
        }
    }
}

/// `$HOME/.aquahash`, or `.aquahash` in the working directory when there is
/// no home directory.
pub fn default_dag_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aquahash")
}

/// Load a TOML config file, with `AQUAHASH_*` environment variables taking
/// precedence over it.
pub fn load_config(path: &Path) -> Result<AquahashConfig> {
    let file_source = File::from(path).required(true).format(FileFormat::Toml);
    let environment_source = Environment::with_prefix("AQUAHASH").try_parsing(true);

    let config = Config::builder()
        .add_source(file_source)
        .add_source(environment_source)
        .build()?
        .try_deserialize()?;
    Ok(config)
}
