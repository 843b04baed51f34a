//! nbdoctest - notebook output regression tester
//!
//! Re-executes the code cells of Jupyter notebooks in a fresh kernel and
//! checks that they still produce the outputs saved in the documents.

use clap::Parser;
use nbdoctest::cli::{self, RunSettings};
use nbdoctest::commands::Cli;
use nbdoctest::common::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let result = match RunSettings::resolve(&cli) {
        Ok(settings) => cli::run(&settings).await,
        Err(e) => Err(e),
    };

    match &result {
        Err(e) if e.is_unavailable() => println!("{}, skipping", e),
        Err(e) => eprintln!("Error: {e}"),
        Ok(_) => {}
    }

    std::process::exit(cli::exit_code(&result));
}
