//! Model checking through the Python bindings of Spot
//!
//! Each query runs a short Python program: the formula is negated and
//! translated to an automaton, the model's Kripke structure is built over
//! the formula's atomic propositions, and the formula holds iff their
//! product is empty.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::common::{Error, Result};

use super::ModelChecker;

/// Exit status the query script uses when the bindings cannot be imported
const UNAVAILABLE_STATUS: i32 = 77;

/// Exit status the query script uses when the checker rejects the query
const REJECTED_STATUS: i32 = 2;

const QUERY_SCRIPT: &str = r#"
import sys
try:
    import spot
    import spot.tchecker as tc
except ImportError as e:
    print(e, file=sys.stderr)
    sys.exit(77)

model_path, text = sys.argv[1], sys.argv[2]
try:
    model = tc.load(model_path)
    formula = spot.formula(text)
    neg = spot.translate(spot.formula_Not(formula))
    k = model.kripke(spot.atomic_prop_collect(formula))
    print("false" if k.intersects(neg) else "true")
except RuntimeError as e:
    print(e, file=sys.stderr)
    sys.exit(2)
"#;

/// [`ModelChecker`] backed by `python3 -c` and the `spot` module
#[derive(Debug, Clone)]
pub struct SpotChecker {
    python: PathBuf,
}

impl SpotChecker {
    /// Locate the interpreter on PATH
    pub fn locate() -> Result<Self> {
        Self::with_interpreter("python3")
    }

    pub fn with_interpreter(program: &str) -> Result<Self> {
        let python = which::which(program)
            .map_err(|_| Error::RuntimeUnavailable(format!("'{}'", program)))?;
        Ok(Self { python })
    }
}

#[async_trait]
impl ModelChecker for SpotChecker {
    async fn satisfies(&self, model: &Path, formula: &str) -> Result<bool> {
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(QUERY_SCRIPT)
            .arg(model)
            .arg(formula)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(formula, status = ?output.status.code(), "Spot query finished");

        match output.status.code() {
            Some(0) => match stdout.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(Error::ModelCheck(format!(
                    "Unexpected checker output: {:?}",
                    other
                ))),
            },
            Some(UNAVAILABLE_STATUS) => Err(Error::RuntimeUnavailable(format!(
                "The Python module 'spot.tchecker' ({})",
                stderr.trim()
            ))),
            Some(REJECTED_STATUS) => Err(Error::ModelCheck(stderr.trim().to_string())),
            _ => Err(Error::ModelCheck(format!(
                "Checker exited with {}: {}",
                output.status,
                stderr.trim()
            ))),
        }
    }
}
