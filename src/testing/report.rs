//! Per-notebook tallies and the overall outcome

use colored::Colorize;

/// How one cell fared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellStatus {
    Passed,
    /// Output count or content differed
    Failed,
    /// The kernel could not be driven for this cell
    Errored(String),
}

/// Result for one code cell
#[derive(Debug, Clone)]
pub struct CellResult {
    /// Position among all cells of the notebook
    pub index: usize,
    pub status: CellStatus,
}

/// Overall state of one notebook run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotebookStatus {
    Passed,
    Failed,
    /// A cell raised the skip signal; remaining cells were not run
    Skipped,
}

/// Result of testing one notebook
#[derive(Debug, Clone)]
pub struct NotebookReport {
    pub path: String,
    pub successes: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: bool,
    pub cells: Vec<CellResult>,
}

impl NotebookReport {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            successes: 0,
            failures: 0,
            errors: 0,
            skipped: false,
            cells: Vec::new(),
        }
    }

    /// Report for a notebook that could not be run at all
    pub fn not_run(path: &str) -> Self {
        let mut report = Self::new(path);
        report.errors = 1;
        report
    }

    pub fn record(&mut self, index: usize, status: CellStatus) {
        match &status {
            CellStatus::Passed => self.successes += 1,
            CellStatus::Failed => self.failures += 1,
            CellStatus::Errored(_) => self.errors += 1,
        }
        self.cells.push(CellResult { index, status });
    }

    pub fn status(&self) -> NotebookStatus {
        if self.skipped {
            NotebookStatus::Skipped
        } else if self.failures > 0 || self.errors > 0 {
            NotebookStatus::Failed
        } else {
            NotebookStatus::Passed
        }
    }

    pub fn print_summary(&self) {
        println!("tested notebook {}", self.path.white().bold());
        println!(
            "    {:>3} cells successfully replicated",
            self.successes.to_string().green()
        );
        if self.failures > 0 {
            println!(
                "    {:>3} cells mismatched output",
                self.failures.to_string().red()
            );
        }
        if self.errors > 0 {
            println!(
                "    {:>3} cells failed to complete",
                self.errors.to_string().red()
            );
        }
    }
}

/// Outcome of the whole run, decided once all notebooks are done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
    /// Not applicable: runtime missing or skip signal raised
    Skip,
}

/// Conventional exit status for "test skipped"
pub const EXIT_SKIP: i32 = 77;

impl RunOutcome {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a NotebookReport>) -> Self {
        let mut outcome = Self::Success;
        for report in reports {
            match report.status() {
                NotebookStatus::Skipped => return Self::Skip,
                NotebookStatus::Failed => outcome = Self::Failure,
                NotebookStatus::Passed => {}
            }
        }
        outcome
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Skip => EXIT_SKIP,
        }
    }
}
