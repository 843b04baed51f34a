//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nbdoctest", about = "Check that notebooks still produce their saved outputs")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Notebooks to test, in order
    #[arg(required = true)]
    pub notebooks: Vec<PathBuf>,

    /// Regular expression whose matches are ignored when comparing outputs
    /// Can be specified multiple times: --ignore '\d+ ms' --ignore 'seed=\w+'
    #[arg(long, short = 'i', value_name = "REGEX")]
    pub ignore: Vec<String>,

    /// Configuration file (default: the per-user config location)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log kernel traffic and other diagnostics to stderr
    #[arg(long, short)]
    pub verbose: bool,
}
