//! tally: exercise ranked and scored sets against the in-memory store.
//!
//! ```text
//! tally demo
//! tally stress --workers 16 --ops 500 --key-space 32
//! RUST_LOG=tally_layer=debug tally --config tally.toml demo
//! ```

mod args;
mod workload;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tally_kv::MemoryDatabase;
use tally_layer::LayerClient;
use tally_layer::LayerConfig;
use tracing::info;

use crate::args::Args;
use crate::args::Command;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = LayerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    info!(
        levels = config.ranked_set.levels,
        level_fan_pow = config.ranked_set.level_fan_pow,
        max_retries = config.retry.max_retries,
        "configuration loaded"
    );

    let db = MemoryDatabase::new();
    let client = LayerClient::with_config(db, config).context("invalid configuration")?;

    match args.command {
        Command::Demo => workload::run_demo(&client).await,
        Command::Stress(stress) => workload::run_stress(&client, &stress).await,
    }
}
