use std::ops::ControlFlow;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ethereum_types::H256;
use eyre::WrapErr as _;

use aquahash::config::{load_config, AquahashConfig};
use aquahash::{FullDAG, LightDAG, ProofResult};

#[derive(Parser, Debug)]
#[command(about = "Aquahash proof of work")]
struct Args {
    /// TOML config file
    #[arg(short, long, global = true)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the seed hash of a block's epoch
    Seedhash { block: u64 },
    /// Print the cache and dataset sizes of a block's epoch
    Sizes { block: u64 },
    /// Evaluate with the cache only
    Light {
        #[arg(long)]
        block: u64,
        #[arg(long, value_parser = parse_h256)]
        header: H256,
        #[arg(long)]
        nonce: u64,
    },
    /// Evaluate against the full dataset, generating it when needed
    Full {
        #[arg(long)]
        block: u64,
        #[arg(long, value_parser = parse_h256)]
        header: H256,
        #[arg(long)]
        nonce: u64,
        /// Overrides the dataset directory of the config
        #[arg(long)]
        dag_dir: Option<PathBuf>,
    },
}

fn parse_h256(s: &str) -> Result<H256, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    Ok(H256::from_slice(&bytes))
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();
    let config = match &args.config_path {
        Some(path) => load_config(path).wrap_err_with(|| format!("failed to load config from {path:?}"))?,
        None => AquahashConfig::default(),
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    match args.command {
        Command::Seedhash { block } => {
            println!("0x{}", hex::encode(aquahash::get_seedhash(block)));
        }
        Command::Sizes { block } => {
            println!("epoch: {}", aquahash::epoch(block));
            println!("cache size: {}", aquahash::get_cache_size(block));
            println!("full size: {}", aquahash::get_full_size(block));
        }
        Command::Light { block, header, nonce } => {
            let light = LightDAG::new(block).wrap_err("failed to build the cache")?;
            print_proof(&light.compute(header, nonce));
        }
        Command::Full {
            block,
            header,
            nonce,
            dag_dir,
        } => {
            let config = AquahashConfig {
                dag_dir: dag_dir.unwrap_or(config.dag_dir),
                ..config
            };
            let light = LightDAG::new(block).wrap_err("failed to build the cache")?;
            let full = FullDAG::with_config(light, &config, |percent| {
                log::info!("dataset generation {percent}%");
                ControlFlow::Continue(())
            })?;
            log::info!("dataset {:?}, {} bytes", full.path(), full.dag_size());
            print_proof(&full.compute(header, nonce));
        }
    }

    Ok(())
}

fn print_proof(proof: &ProofResult) {
    println!("success: {}", proof.success);
    println!("result: 0x{}", hex::encode(proof.result));
    println!("mix hash: 0x{}", hex::encode(proof.mix_hash));
}
