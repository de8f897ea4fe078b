//! CLI definitions for mesi-sim.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(
    name = "mesi-sim",
    version,
    about = "Directory-based MESI cache-coherence simulator\n\nRuns a fixed set of processor nodes against per-node instruction streams and reports final cache/directory/memory state.",
    long_about = None
)]
pub struct Cli {
    /// Directory containing core_0.txt .. core_<N_PROCS-1>.txt
    pub test_directory: PathBuf,

    /// Path to an optional mesi.toml config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Directory to write core_<k>_output.txt files into (overrides config)
    #[clap(long)]
    pub output_dir: Option<PathBuf>,
}
