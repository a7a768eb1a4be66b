//! Command-line arguments for the tally binary.

use std::path::PathBuf;

use clap::Args as ClapArgs;
use clap::Parser;
use clap::Subcommand;

/// Rank-indexed sets over an in-memory transactional store.
#[derive(Parser, Debug)]
#[command(name = "tally", version)]
pub struct Args {
    /// Path to TOML configuration file.
    #[arg(long, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk through ranked and scored set operations and print the results.
    Demo,

    /// Run concurrent writers against one ranked set and verify the index.
    Stress(StressArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StressArgs {
    /// Concurrent writer tasks.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=256))]
    pub workers: u32,

    /// Operations per worker.
    #[arg(long, default_value_t = 200)]
    pub ops: u32,

    /// Number of distinct keys the workers draw from. Smaller means more conflicts.
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    pub key_space: u32,

    /// Seed for the per-worker random generators.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}
