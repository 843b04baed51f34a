//! Model-checker smoke test
//!
//! A fixed timed-automaton model and three LTL queries whose answers are
//! known. Running them checks that the checker bindings load models and
//! report both verdicts and rejected queries correctly.

mod spot;

use std::path::Path;

use async_trait::async_trait;

use crate::common::{Error, Result};

pub use spot::SpotChecker;

/// Critical-region system with one producer cell, in tchecker's text format
pub const CRITICAL_REGION_MODEL: &str = "\
system:critical_region_1_10
event:tau
event:enter1
event:exit1
int:1:0:1:0:id
process:counter
location:counter:I{initial:}
location:counter:C{}
edge:counter:I:C:tau{provided: id==0 : do: id=1}
edge:counter:C:C:tau{provided: id<1 : do: id=id+1}
edge:counter:C:C:tau{provided: id==1 : do: id=1}
process:arbiter1
location:arbiter1:req{initial:}
location:arbiter1:ack{}
edge:arbiter1:req:ack:enter1{provided: id==1 : do: id=0}
edge:arbiter1:ack:req:exit1{do: id=1}
process:prodcell1
clock:1:x1
location:prodcell1:not_ready{initial:}
location:prodcell1:testing{invariant: x1<=10}
location:prodcell1:requesting{}
location:prodcell1:critical{invariant: x1<=20}
location:prodcell1:testing2{invariant: x1<=10}
location:prodcell1:safe{}
location:prodcell1:error{}
edge:prodcell1:not_ready:testing:tau{provided: x1<=20 : do: x1=0}
edge:prodcell1:testing:not_ready:tau{provided: x1>=10 : do: x1=0}
edge:prodcell1:testing:requesting:tau{provided: x1<=9}
edge:prodcell1:requesting:critical:enter1{do: x1=0}
edge:prodcell1:critical:error:tau{provided: x1>=20}
edge:prodcell1:critical:testing2:exit1{provided: x1<=9 : do: x1=0}
edge:prodcell1:testing2:error:tau{provided: x1>=10}
edge:prodcell1:testing2:safe:tau{provided: x1<=9}
sync:arbiter1@enter1:prodcell1@enter1
sync:arbiter1@exit1:prodcell1@exit1
";

/// Answers LTL queries about a model file
#[async_trait]
pub trait ModelChecker: Send + Sync {
    /// Whether every run of `model` satisfies `formula`
    ///
    /// Queries the checker rejects (e.g. an unknown proposition) fail with
    /// [`Error::ModelCheck`].
    async fn satisfies(&self, model: &Path, formula: &str) -> Result<bool>;
}

/// Expected answer to one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Holds,
    Violated,
    /// The query must be rejected with a message containing this text
    RejectedMentioning(&'static str),
}

/// One query with its known answer
#[derive(Debug, Clone, Copy)]
pub struct SmokeCheck {
    pub formula: &'static str,
    pub expect: Expectation,
}

/// Queries run against [`CRITICAL_REGION_MODEL`]
pub const SMOKE_CHECKS: &[SmokeCheck] = &[
    SmokeCheck {
        formula: "G(arbiter1.req | arbiter1.ack)",
        expect: Expectation::Holds,
    },
    SmokeCheck {
        formula: "G(arbiter1.req -> F(arbiter1.ack))",
        expect: Expectation::Violated,
    },
    SmokeCheck {
        formula: "G(arbiter1.req | foo)",
        expect: Expectation::RejectedMentioning("foo"),
    },
];

/// What happened to one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub formula: &'static str,
    /// `None` when the answer was as expected, otherwise what went wrong
    pub failure: Option<String>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

fn judge(check: &SmokeCheck, answer: Result<bool>) -> Result<Option<String>> {
    let failure = match (check.expect, answer) {
        (_, Err(e)) if e.is_unavailable() => return Err(e),
        (Expectation::Holds, Ok(true)) | (Expectation::Violated, Ok(false)) => None,
        (Expectation::Holds, Ok(false)) => Some("expected to hold, but is violated".to_string()),
        (Expectation::Violated, Ok(true)) => Some("expected to be violated, but holds".to_string()),
        (Expectation::RejectedMentioning(_), Ok(verdict)) => Some(format!(
            "expected an error, but the checker answered {}",
            verdict
        )),
        (Expectation::RejectedMentioning(needle), Err(Error::ModelCheck(message))) => {
            if message.contains(needle) {
                None
            } else {
                Some(format!("error does not mention '{}': {}", needle, message))
            }
        }
        (_, Err(e)) => Some(e.to_string()),
    };
    Ok(failure)
}

/// Run every smoke query against `model`
///
/// Stops with [`Error::RuntimeUnavailable`] as soon as the checker turns
/// out to be missing; all other outcomes are reported per query.
pub async fn run_smoke<C: ModelChecker + ?Sized>(
    checker: &C,
    model: &Path,
    checks: &[SmokeCheck],
) -> Result<Vec<CheckResult>> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let answer = checker.satisfies(model, check.formula).await;
        let failure = judge(check, answer)?;
        if let Some(reason) = &failure {
            tracing::debug!(formula = check.formula, "Smoke check failed: {}", reason);
        }
        results.push(CheckResult {
            formula: check.formula,
            failure,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers from a table; formulas not in it are rejected by name
    struct TableChecker(HashMap<&'static str, bool>);

    #[async_trait]
    impl ModelChecker for TableChecker {
        async fn satisfies(&self, _model: &Path, formula: &str) -> Result<bool> {
            self.0
                .get(formula)
                .copied()
                .ok_or_else(|| Error::ModelCheck(format!("unknown formula {}", formula)))
        }
    }

    struct MissingChecker;

    #[async_trait]
    impl ModelChecker for MissingChecker {
        async fn satisfies(&self, _model: &Path, _formula: &str) -> Result<bool> {
            Err(Error::RuntimeUnavailable("'python3'".into()))
        }
    }

    #[tokio::test]
    async fn test_correct_checker_passes() {
        let checker = TableChecker(HashMap::from([
            ("G(arbiter1.req | arbiter1.ack)", true),
            ("G(arbiter1.req -> F(arbiter1.ack))", false),
        ]));
        let results = run_smoke(&checker, Path::new("m.tc"), SMOKE_CHECKS)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(CheckResult::passed), "{:?}", results);
    }

    #[tokio::test]
    async fn test_wrong_verdicts_fail() {
        let checker = TableChecker(HashMap::from([
            ("G(arbiter1.req | arbiter1.ack)", false),
            ("G(arbiter1.req -> F(arbiter1.ack))", true),
            ("G(arbiter1.req | foo)", true),
        ]));
        let results = run_smoke(&checker, Path::new("m.tc"), SMOKE_CHECKS)
            .await
            .unwrap();
        assert!(results.iter().all(|r| !r.passed()));
        assert!(results[2]
            .failure
            .as_deref()
            .unwrap()
            .contains("expected an error"));
    }

    #[test]
    fn test_rejection_must_mention_name() {
        let check = SmokeCheck {
            formula: "G(a | foo)",
            expect: Expectation::RejectedMentioning("foo"),
        };
        let failure = judge(&check, Err(Error::ModelCheck("parse error".into()))).unwrap();
        assert!(failure.unwrap().contains("does not mention 'foo'"));
        let other = judge(&check, Err(Error::KernelDied)).unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_aborts() {
        let err = run_smoke(&MissingChecker, Path::new("m.tc"), SMOKE_CHECKS)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_model_mentions_arbiter_locations() {
        assert!(CRITICAL_REGION_MODEL.contains("location:arbiter1:req{initial:}"));
        assert!(CRITICAL_REGION_MODEL.contains("location:arbiter1:ack{}"));
        assert!(CRITICAL_REGION_MODEL.ends_with('\n'));
    }
}
