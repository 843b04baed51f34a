//! Output comparison
//!
//! Both output lists are canonicalized and rendered to a stable text form;
//! equality is string equality of the renderings, and a mismatch carries a
//! unified diff of them.

use std::fmt::Write;

use serde_json::{Map, Value};
use similar::TextDiff;

use crate::notebook::{MimeBundle, OutputRecord};

use super::canonical::Canonicalizer;

/// Result of comparing expected and observed outputs of one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch { diff: String },
    /// A record asked for the whole run to be skipped
    Skip,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compare two output lists after canonicalization
pub fn compare_outputs(
    expected: &[OutputRecord],
    observed: &[OutputRecord],
    canonicalizer: &Canonicalizer,
) -> Comparison {
    if expected
        .iter()
        .chain(observed)
        .any(OutputRecord::is_skip_signal)
    {
        return Comparison::Skip;
    }

    let canonical = |records: &[OutputRecord]| -> Vec<OutputRecord> {
        records.iter().map(|r| canonicalizer.canonicalize(r)).collect()
    };
    let exp = ensure_trailing_newline(render(&canonical(expected)));
    let eff = ensure_trailing_newline(render(&canonical(observed)));

    if exp == eff {
        Comparison::Match
    } else {
        let diff = TextDiff::from_lines(&exp, &eff)
            .unified_diff()
            .context_radius(3)
            .header("expected", "effective")
            .to_string();
        Comparison::Mismatch { diff }
    }
}

fn ensure_trailing_newline(mut s: String) -> String {
    s.truncate(s.trim_end_matches('\n').len());
    s.push('\n');
    s
}

/// Render records as indented text, one field per line
///
/// Multi-line strings become blocks of `| `-prefixed lines so that a diff
/// points at the offending line rather than the whole field.
pub fn render(records: &[OutputRecord]) -> String {
    if records.is_empty() {
        return "[]\n".to_string();
    }

    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i, record.output_type());
        match record {
            OutputRecord::Stream { name, text } => {
                push_text(&mut out, 1, "name", name);
                push_text(&mut out, 1, "text", text);
            }
            OutputRecord::DisplayData {
                data,
                metadata,
                transient,
            } => {
                push_bundle(&mut out, data);
                push_metadata(&mut out, metadata);
                if let Some(transient) = transient {
                    let _ = writeln!(out, "  transient: {}", transient);
                }
            }
            OutputRecord::ExecuteResult {
                data,
                metadata,
                execution_count,
            } => {
                if let Some(count) = execution_count {
                    let _ = writeln!(out, "  execution_count: {}", count);
                }
                push_bundle(&mut out, data);
                push_metadata(&mut out, metadata);
            }
            OutputRecord::Error {
                ename,
                evalue,
                traceback,
            } => {
                push_text(&mut out, 1, "ename", ename);
                push_text(&mut out, 1, "evalue", evalue);
                if !traceback.is_empty() {
                    push_text(&mut out, 1, "traceback", &traceback.join("\n"));
                }
            }
        }
    }
    out
}

fn push_text(out: &mut String, depth: usize, key: &str, text: &str) {
    let indent = "  ".repeat(depth);
    if text.contains('\n') {
        let _ = writeln!(out, "{}{}:", indent, key);
        for line in text.split('\n') {
            let _ = writeln!(out, "{}  | {}", indent, line);
        }
    } else {
        let _ = writeln!(out, "{}{}: {:?}", indent, key, text);
    }
}

fn push_bundle(out: &mut String, data: &MimeBundle) {
    out.push_str("  data:\n");
    for (mime, payload) in data {
        match payload {
            Value::String(text) => push_text(out, 2, mime, text),
            other => {
                let _ = writeln!(out, "    {}: {}", mime, other);
            }
        }
    }
}

fn push_metadata(out: &mut String, metadata: &Map<String, Value>) {
    if !metadata.is_empty() {
        let _ = writeln!(out, "  metadata: {}", Value::Object(metadata.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stdout(text: &str) -> OutputRecord {
        OutputRecord::Stream {
            name: "stdout".into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_match_ignores_bookkeeping() {
        let c = Canonicalizer::default();
        let expected = vec![OutputRecord::ExecuteResult {
            data: [("text/plain".to_string(), json!("3"))].into(),
            metadata: Default::default(),
            execution_count: Some(1),
        }];
        let observed = vec![OutputRecord::ExecuteResult {
            data: [("text/plain".to_string(), json!("3"))].into(),
            metadata: Default::default(),
            execution_count: Some(12),
        }];
        assert_eq!(compare_outputs(&expected, &observed, &c), Comparison::Match);
    }

    #[test]
    fn test_mismatch_diff() {
        let c = Canonicalizer::default();
        let result = compare_outputs(&[stdout("a\nb\nc\n")], &[stdout("a\nB\nc\n")], &c);
        match result {
            Comparison::Mismatch { diff } => {
                assert!(diff.contains("--- expected"));
                assert!(diff.contains("+++ effective"));
                assert!(diff.contains("-    | b"));
                assert!(diff.contains("+    | B"));
            }
            other => panic!("Expected Mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_count_difference_is_mismatch() {
        let c = Canonicalizer::default();
        let result = compare_outputs(&[stdout("x")], &[], &c);
        assert!(matches!(result, Comparison::Mismatch { .. }));
    }

    #[test]
    fn test_skip_signal_on_either_side() {
        let c = Canonicalizer::default();
        let skip = OutputRecord::Error {
            ename: "SystemExit".into(),
            evalue: "77".into(),
            traceback: vec![],
        };
        assert_eq!(
            compare_outputs(&[], &[skip.clone()], &c),
            Comparison::Skip
        );
        assert_eq!(compare_outputs(&[skip], &[stdout("x")], &c), Comparison::Skip);
    }

    #[test]
    fn test_render_layout() {
        let rendered = render(&[
            stdout("hello\nworld"),
            OutputRecord::Error {
                ename: "ZeroDivisionError".into(),
                evalue: "division by zero".into(),
                traceback: vec![],
            },
        ]);
        assert_eq!(
            rendered,
            "[0] stream\n  name: \"stdout\"\n  text:\n    | hello\n    | world\n\
             [1] error\n  ename: \"ZeroDivisionError\"\n  evalue: \"division by zero\"\n"
        );
        assert_eq!(render(&[]), "[]\n");
    }

    #[test]
    fn test_trailing_newline_normalized() {
        assert_eq!(ensure_trailing_newline("x".into()), "x\n");
        assert_eq!(ensure_trailing_newline("x\n\n".into()), "x\n");
    }
}
