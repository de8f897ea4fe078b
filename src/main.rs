//! mesi-sim — directory-based MESI cache-coherence simulator.
//!
//! Runs `N_PROCS` processor nodes against per-node instruction streams and writes one
//! final state dump per node. Run `mesi-sim --help` for usage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::Cli;
use config::SimConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config file: {}", path.display()))?,
        None => SimConfig::default(),
    };

    let output_dir = cli.output_dir.clone().unwrap_or_else(|| PathBuf::from(&config.output_dir));

    if !cli.test_directory.is_dir() {
        anyhow::bail!("test directory {} does not exist", cli.test_directory.display());
    }

    let opts = mesi_core::runtime::RunOptions {
        output_dir,
        trace_messages: config.trace_messages,
        check_invariants: config.check_invariants,
    };

    mesi_core::runtime::run(&cli.test_directory, opts)
        .with_context(|| format!("simulation failed for {}", cli.test_directory.display()))?;

    Ok(())
}
