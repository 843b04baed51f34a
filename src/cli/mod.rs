//! CLI command handling
//!
//! Drives one kernel per notebook and prints per-cell results and
//! summaries on stdout.

use std::future::Future;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::commands::Cli;
use crate::common::config::{Config, Timeouts};
use crate::common::{Error, Result};
use crate::kernel::{KernelClient, KernelSpec, KernelTransport};
use crate::notebook::Notebook;
use crate::testing::{run_notebook, wait_for_ready, Canonicalizer, NotebookReport, RunOutcome};

/// Everything a run needs, resolved from arguments and config
pub struct RunSettings {
    pub notebooks: Vec<PathBuf>,
    pub spec: KernelSpec,
    pub canonicalizer: Canonicalizer,
    pub timeouts: Timeouts,
}

impl RunSettings {
    /// Merge command-line arguments over the configuration file
    ///
    /// Ignore patterns from the config come first, then those given with
    /// `--ignore`, which fixes the numbering of `IGN<n>` tokens.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        let patterns: Vec<&str> = config
            .compare
            .ignore
            .iter()
            .chain(&cli.ignore)
            .map(String::as_str)
            .collect();

        Ok(Self {
            notebooks: cli.notebooks.clone(),
            spec: KernelSpec::from_config(&config.kernel),
            canonicalizer: Canonicalizer::new(&patterns)?,
            timeouts: config.timeouts,
        })
    }
}

/// Test every notebook in order
///
/// Returns `Err(RuntimeUnavailable)` before anything runs when the kernel
/// runtime is missing. A notebook that raises the skip signal ends the run.
pub async fn run(settings: &RunSettings) -> Result<RunOutcome> {
    settings.spec.check_runtime().await?;

    let spec = &settings.spec;
    let startup = settings.timeouts.startup();
    let shutdown = settings.timeouts.shutdown();
    let reports = run_notebooks(settings, move || {
        KernelClient::launch(spec, startup, shutdown)
    })
    .await?;

    Ok(RunOutcome::from_reports(&reports))
}

/// Test every notebook in order, starting each kernel with `launch`
///
/// Stops after the first notebook that raises the skip signal. Only a
/// missing runtime is returned as an error.
pub async fn run_notebooks<K, F, Fut>(
    settings: &RunSettings,
    mut launch: F,
) -> Result<Vec<NotebookReport>>
where
    K: KernelTransport,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<K>>,
{
    let mut reports = Vec::with_capacity(settings.notebooks.len());
    for path in &settings.notebooks {
        println!("testing {}", path.display().to_string().bold());
        let report = test_notebook(path, settings, &mut launch).await?;
        let skipped = report.skipped;
        reports.push(report);
        if skipped {
            tracing::info!(notebook = %path.display(), "Skip requested, stopping");
            break;
        }
    }
    Ok(reports)
}

/// Test one notebook in a fresh kernel
///
/// Every problem other than a missing runtime is counted against the
/// notebook.
async fn test_notebook<K, F, Fut>(
    path: &Path,
    settings: &RunSettings,
    launch: &mut F,
) -> Result<NotebookReport>
where
    K: KernelTransport,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<K>>,
{
    let name = path.display().to_string();

    let notebook = match Notebook::load(path) {
        Ok(notebook) => notebook,
        Err(e) => {
            println!("{} {}", "failed to read notebook:".red(), e);
            let report = NotebookReport::not_run(&name);
            report.print_summary();
            return Ok(report);
        }
    };

    let mut kernel = match launch().await {
        Ok(kernel) => kernel,
        Err(e) if e.is_unavailable() => return Err(e),
        Err(e) => {
            println!("{} {}", "failed to start kernel:".red(), e);
            let report = NotebookReport::not_run(&name);
            report.print_summary();
            return Ok(report);
        }
    };

    let report = test_with_kernel(&mut kernel, &name, &notebook, settings).await;

    if let Err(e) = kernel.shutdown().await {
        tracing::warn!("Kernel shutdown failed: {}", e);
    }

    report.print_summary();
    Ok(report)
}

/// Wait for the kernel, then run the notebook's cells on it
pub async fn test_with_kernel<T: KernelTransport + ?Sized>(
    kernel: &mut T,
    name: &str,
    notebook: &Notebook,
    settings: &RunSettings,
) -> NotebookReport {
    if let Err(e) = wait_for_ready(
        kernel,
        settings.timeouts.startup(),
        settings.timeouts.iopub_idle(),
    )
    .await
    {
        println!("{} {}", "kernel not ready:".red(), e);
        return NotebookReport::not_run(name);
    }

    run_notebook(
        kernel,
        name,
        notebook,
        &settings.canonicalizer,
        &settings.timeouts,
    )
    .await
}

/// Map a run result to the process exit status
pub fn exit_code(result: &Result<RunOutcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(Error::RuntimeUnavailable(_)) => crate::testing::EXIT_SKIP,
        Err(_) => 1,
    }
}
