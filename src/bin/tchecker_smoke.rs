//! Smoke test for the timed-automata model checker bindings
//!
//! Writes a small model to a temporary file in the current directory and
//! checks three LTL queries with known answers. Exits 0 when all answers
//! are right, 1 otherwise, and 77 when the checker is not installed.

use std::io::Write;

use colored::Colorize;
use nbdoctest::common::logging;
use nbdoctest::modelcheck::{run_smoke, SpotChecker, CRITICAL_REGION_MODEL, SMOKE_CHECKS};
use nbdoctest::testing::EXIT_SKIP;
use nbdoctest::Result;

async fn smoke() -> Result<bool> {
    let checker = SpotChecker::locate()?;

    let mut model = tempfile::Builder::new()
        .prefix("critical-region-")
        .suffix(".tc")
        .tempfile_in(".")?;
    model.write_all(CRITICAL_REGION_MODEL.as_bytes())?;
    model.flush()?;

    let results = run_smoke(&checker, model.path(), SMOKE_CHECKS).await?;

    let mut all_passed = true;
    for result in &results {
        match &result.failure {
            None => println!("{} {}", "ok  ".green(), result.formula),
            Some(reason) => {
                all_passed = false;
                println!("{} {}: {}", "FAIL".red().bold(), result.formula, reason);
            }
        }
    }
    Ok(all_passed)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_cli(false);

    let code = match smoke().await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) if e.is_unavailable() => {
            println!("{}, skipping", e);
            EXIT_SKIP
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}
