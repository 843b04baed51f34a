//! Notebook runner
//!
//! Executes the code cells of a notebook one at a time through a
//! [`KernelTransport`] and compares what each cell publishes with the
//! outputs stored in the document.

use std::time::Duration;

use colored::Colorize;
use serde::Deserialize;
use tokio::time::Instant;

use crate::common::config::Timeouts;
use crate::common::{Error, Result};
use crate::kernel::{KernelMessage, KernelTransport};
use crate::notebook::{CodeCell, Notebook, OutputRecord};

use super::canonical::Canonicalizer;
use super::compare::{compare_outputs, Comparison};
use super::report::{CellStatus, NotebookReport};

/// iopub messages that never become outputs
const HOUSEKEEPING: &[&str] = &[
    "status",
    "pyin",
    "execute_input",
    "comm_open",
    "comm_msg",
    "comm_close",
];

/// Cells whose output depends on wall-clock timing
const UNREPRODUCIBLE_PREFIXES: &[&str] = &["%timeit"];

#[derive(Deserialize)]
struct StreamContent {
    name: String,
    text: String,
}

/// Whether collection for a cell should go on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The kernel reported idle: the cell is done
    Idle,
}

/// Fold one iopub message into the outputs collected so far
///
/// Consecutive stream messages with the same name are concatenated and a
/// `clear_output` drops everything collected before it.
pub fn accumulate(outs: &mut Vec<OutputRecord>, msg: &KernelMessage) -> Result<Flow> {
    let msg_type = msg.msg_type();

    if msg.execution_state() == Some("idle") {
        return Ok(Flow::Idle);
    }
    if HOUSEKEEPING.contains(&msg_type) {
        return Ok(Flow::Continue);
    }

    match msg_type {
        "clear_output" => outs.clear(),
        "stream" => {
            let content: StreamContent = serde_json::from_value(msg.content.clone())
                .map_err(|e| Error::KernelProtocol(format!("Invalid stream message: {}", e)))?;
            // widget frontends chatter on stdout
            if content.text.contains("Widget") {
                return Ok(Flow::Continue);
            }
            if let Some(OutputRecord::Stream { name, text }) = outs.last_mut() {
                if *name == content.name {
                    text.push_str(&content.text);
                    return Ok(Flow::Continue);
                }
            }
            outs.push(OutputRecord::Stream {
                name: content.name,
                text: content.text,
            });
        }
        _ => match OutputRecord::from_message(msg_type, &msg.content) {
            Ok(record) => outs.push(record),
            Err(e) => tracing::warn!(msg_type, "Ignoring unrecognized iopub message: {}", e),
        },
    }
    Ok(Flow::Continue)
}

/// Wait for the shell reply to `msg_id`, discarding anything else
async fn await_reply<T: KernelTransport + ?Sized>(
    kernel: &mut T,
    msg_id: &str,
    reply_type: &str,
    wait: Duration,
) -> Result<KernelMessage> {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match kernel.recv_shell(remaining).await? {
            Some(msg) if msg.parent_msg_id() == Some(msg_id) && msg.msg_type() == reply_type => {
                return Ok(msg)
            }
            Some(msg) => {
                tracing::debug!(msg_type = msg.msg_type(), "Discarding unrelated shell message");
                if remaining.is_zero() {
                    return Err(Error::timeout(reply_type, wait));
                }
            }
            None => return Err(Error::timeout(reply_type, wait)),
        }
    }
}

/// Block until the kernel answers `kernel_info` and iopub has gone quiet
pub async fn wait_for_ready<T: KernelTransport + ?Sized>(
    kernel: &mut T,
    reply_timeout: Duration,
    idle_timeout: Duration,
) -> Result<()> {
    let msg_id = kernel.kernel_info().await?;
    let reply = await_reply(kernel, &msg_id, "kernel_info_reply", reply_timeout).await?;
    tracing::debug!(
        protocol = reply
            .content
            .get("protocol_version")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown"),
        "Kernel ready"
    );

    // flush startup chatter
    while kernel.recv_iopub(idle_timeout).await?.is_some() {}
    Ok(())
}

/// Execute one cell and collect the outputs it publishes
pub async fn run_cell<T: KernelTransport + ?Sized>(
    kernel: &mut T,
    source: &str,
    timeouts: &Timeouts,
) -> Result<Vec<OutputRecord>> {
    let msg_id = kernel.execute(source).await?;
    let reply = await_reply(kernel, &msg_id, "execute_reply", timeouts.reply()).await?;
    tracing::debug!(
        status = reply
            .content
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown"),
        "execute_reply"
    );

    let mut outs = Vec::new();
    while let Some(msg) = kernel.recv_iopub(timeouts.iopub_idle()).await? {
        if msg.parent_msg_id() != Some(msg_id.as_str()) {
            tracing::debug!(msg_type = msg.msg_type(), "Skipping message for another request");
            continue;
        }
        if accumulate(&mut outs, &msg)? == Flow::Idle {
            break;
        }
    }
    Ok(outs)
}

fn is_reproducible(source: &str) -> bool {
    !UNREPRODUCIBLE_PREFIXES
        .iter()
        .any(|prefix| source.starts_with(prefix))
}

/// Run every code cell of a notebook and tally the results
///
/// The kernel must already be ready. Stops at the first cell that raises
/// the skip signal and marks the report skipped.
pub async fn run_notebook<T: KernelTransport + ?Sized>(
    kernel: &mut T,
    path: &str,
    notebook: &Notebook,
    canonicalizer: &Canonicalizer,
    timeouts: &Timeouts,
) -> NotebookReport {
    let mut report = NotebookReport::new(path);

    for cell in notebook.code_cells() {
        if !is_reproducible(cell.source) {
            tracing::debug!(cell = cell.index, "Not running timing-dependent cell");
            continue;
        }

        let status = match run_cell(kernel, cell.source, timeouts).await {
            Ok(outs) => match check_cell(&cell, &outs, canonicalizer) {
                Some((status, diagnostics)) => {
                    for line in diagnostics {
                        print!("{}", line);
                    }
                    status
                }
                None => {
                    println!("cell {}: {}", cell.index, "SKIP".yellow());
                    report.skipped = true;
                    return report;
                }
            },
            Err(e) => {
                println!("{} {}", "failed to run cell:".red(), e);
                println!("{}", cell.source.dimmed());
                CellStatus::Errored(e.to_string())
            }
        };

        match &status {
            CellStatus::Passed => println!("cell {}: {}", cell.index, "OK".green()),
            CellStatus::Failed => println!("cell {}: {}", cell.index, "FAIL".red().bold()),
            CellStatus::Errored(_) => {}
        }
        report.record(cell.index, status);
    }

    report
}

/// Compare one cell; `None` means the skip signal was raised
///
/// On a verdict, also returns the diagnostics to print: the count mismatch
/// line and the diff, each newline-terminated.
fn check_cell(
    cell: &CodeCell<'_>,
    outs: &[OutputRecord],
    canonicalizer: &Canonicalizer,
) -> Option<(CellStatus, Vec<String>)> {
    let comparison = compare_outputs(cell.outputs, outs, canonicalizer);
    if comparison == Comparison::Skip {
        return None;
    }

    let mut diagnostics = Vec::new();
    if outs.len() != cell.outputs.len() {
        diagnostics.push(format!(
            "output length mismatch (expected {}, got {})\n",
            cell.outputs.len(),
            outs.len()
        ));
    }
    if let Comparison::Mismatch { diff } = comparison {
        diagnostics.push(diff);
    }

    let status = if diagnostics.is_empty() {
        CellStatus::Passed
    } else {
        CellStatus::Failed
    };
    Some((status, diagnostics))
}
