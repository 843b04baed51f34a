//! Output canonicalization
//!
//! Rewrites an output record so that run-specific noise (memory addresses,
//! UUIDs, layout-engine geometry, tool banners) does not affect equality.
//! Canonicalizing an already canonical record is a no-op.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::common::{Error, Result};
use crate::notebook::{mime_text, MimeBundle, OutputRecord};

/// Rewrites applied to every string, in order
///
/// `(?s)` marks rules whose wildcards must also cross line breaks.
const REWRITE_RULES: &[(&str, &str)] = &[
    // -- run-specific identifiers --
    (r"at 0x[a-f0-9]+", "object"),
    (r"[a-f0-9]{8}(-[a-f0-9]{4}){3}-[a-f0-9]{12}", "U-U-I-D"),
    // -- tool banners and module paths --
    (r"<spot\.impl\.", "<spot."),
    (r"Generated by graphviz version.*", "VERSION"),
    (
        r"(?s)SpinS Promela Compiler.*Compiled C .* to .*pml\.spins",
        "SpinS output",
    ),
    (r"^Overwriting ", "Writing "),
    // -- SVG geometry, which differs between graphviz builds --
    (r#"<path[^/]* d="[^"]*""#, "<path"),
    (r#"points="[^"]*""#, r#"points="""#),
    (r#"x="[0-9.-]+""#, r#"x="""#),
    (r#"y="[0-9.-]+""#, r#"y="""#),
    (r#"width="[0-9.]+pt""#, r#"width="""#),
    (r#"height="[0-9.]+pt""#, r#"height="""#),
    (r#"viewBox="[0-9 .-]*""#, r#"viewbox="""#),
    (r#"transform="[^"]*""#, r#"transform="""#),
    (r#"id="edge[^"]*""#, r#"id="edge""#),
    (r#"text-anchor="[^"]*""#, r#"text-anchor="""#),
    // -- graphviz 2.40 palette written back as 2.38 color names --
    (r##""#000000""##, r#""black""#),
    (r##""#ffffff""##, r#""white""#),
    (r##""#ffff00""##, r#""yellow""#),
    (r##""#00ffff""##, r#""cyan""#),
    (r##""#ffc0cb""##, r#""pink""#),
    (r##""#00ff00""##, r#""green""#),
    (r##""#ff0000""##, r#""red""#),
    (r##""#c0c0c0""##, r#""grey""#),
    (r##""#ffa500""##, r#""orange""#),
    (r#""gray""#, r#""grey""#),
    (r#" fill="black""#, ""),
    (r#" stroke="transparent""#, r#" stroke="none""#),
    (r"><title>", ">\n<title>"),
    // multi-line tooltips were rendered differently before 2.40
    (r#"<a xlink:title="[^"]*, [^"]*">\n"#, "<a xlink:title=\"...\">\n"),
    // -- dataframe rendering --
    (r"(?s)<style[ a-z]*>.*</style>\n", ""),
    // SAT-solver logs carry timings
    (
        r"(?s)<table.*dataframe.*?enc\.user.*?</table>",
        "<table></table>",
    ),
];

/// Rewrites applied to the value of errors with the given name
///
/// Python 3.6 added a final dot to `CalledProcessError` messages.
const ERROR_VALUE_RULES: &[(&str, &str, &str)] = &[(
    "CalledProcessError",
    r"(' returned non-zero exit status \d+)\.",
    "$1",
)];

/// Placeholder left by ignore pattern `n` is `IGN<n>`
static IGNORE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IGN[0-9]+").expect("valid ignore token regex"));

static COMPILED_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    REWRITE_RULES
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("valid rewrite rule regex"),
                *replacement,
            )
        })
        .collect()
});

static COMPILED_ERROR_RULES: LazyLock<Vec<(&'static str, Regex, &'static str)>> =
    LazyLock::new(|| {
        ERROR_VALUE_RULES
            .iter()
            .map(|(ename, pattern, replacement)| {
                (
                    *ename,
                    Regex::new(pattern).expect("valid error rule regex"),
                    *replacement,
                )
            })
            .collect()
    });

/// Canonicalizes output records with a fixed rule set plus caller patterns
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    ignores: Vec<Regex>,
}

impl Canonicalizer {
    /// Compile the caller's ignore patterns, in order
    ///
    /// Patterns that match the empty string are rejected: they would insert
    /// a placeholder at every position.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let ignores = patterns
            .iter()
            .map(|p| {
                let pattern = p.as_ref();
                let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    error: e.to_string(),
                })?;
                if regex.is_match("") {
                    return Err(Error::InvalidPattern {
                        pattern: pattern.to_string(),
                        error: "pattern matches the empty string".to_string(),
                    });
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ignores })
    }

    /// Canonical form of a piece of output text
    ///
    /// Passes are repeated until the text stops changing: a removal can
    /// expose a match for a rule that ran earlier in the same pass.
    pub fn canonicalize_text(&self, text: &str) -> String {
        fixed_point(text.to_string(), |s| self.pass(s))
    }

    fn pass(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        // trailing newlines only; trailing spaces are significant
        let mut s = outside_tokens(text.trim_end_matches('\n'), apply_rules);

        for (n, regex) in self.ignores.iter().enumerate() {
            let placeholder = format!("IGN{}", n);
            s = outside_tokens(&s, |segment| {
                regex
                    .replace_all(segment, NoExpand(&placeholder))
                    .into_owned()
            });
        }

        // a removal may have exposed new trailing newlines
        s.truncate(s.trim_end_matches('\n').len());
        s
    }

    /// Canonical form of a record, with bookkeeping fields dropped
    pub fn canonicalize(&self, record: &OutputRecord) -> OutputRecord {
        match record {
            OutputRecord::Stream { name, text } => OutputRecord::Stream {
                name: name.clone(),
                text: self.canonicalize_text(text),
            },
            OutputRecord::DisplayData { data, metadata, .. } => OutputRecord::DisplayData {
                data: self.canonicalize_bundle(data),
                metadata: metadata.clone(),
                transient: None,
            },
            OutputRecord::ExecuteResult { data, metadata, .. } => OutputRecord::ExecuteResult {
                data: self.canonicalize_bundle(data),
                metadata: metadata.clone(),
                execution_count: None,
            },
            OutputRecord::Error { ename, evalue, .. } => OutputRecord::Error {
                ename: ename.clone(),
                evalue: fixed_point(self.canonicalize_text(evalue), |value| {
                    self.canonicalize_text(&canonicalize_error_value(ename, value))
                }),
                traceback: Vec::new(),
            },
        }
    }

    fn canonicalize_bundle(&self, data: &MimeBundle) -> MimeBundle {
        // The HTML rendering wins when both exist; the plain-text fallback
        // of rich objects varies between library versions.
        let drop_plain = data.contains_key("text/html") && data.contains_key("text/plain");
        data.iter()
            .filter(|(mime, _)| !(drop_plain && mime.as_str() == "text/plain"))
            .map(|(mime, payload)| {
                let payload = match mime_text(mime, payload) {
                    Some(text) => serde_json::Value::String(self.canonicalize_text(&text)),
                    None => payload.clone(),
                };
                (mime.clone(), payload)
            })
            .collect()
    }
}

fn canonicalize_error_value(ename: &str, evalue: &str) -> String {
    COMPILED_ERROR_RULES
        .iter()
        .filter(|(name, _, _)| *name == ename)
        .fold(evalue.to_string(), |value, (_, regex, replacement)| {
            regex.replace_all(&value, *replacement).into_owned()
        })
}

/// Upper bound on canonicalization passes; rule sets converge in two or three
const MAX_PASSES: usize = 16;

/// Apply `step` until the value stops changing
fn fixed_point(mut value: String, step: impl Fn(&str) -> String) -> String {
    for _ in 0..MAX_PASSES {
        let next = step(&value);
        if next == value {
            return value;
        }
        value = next;
    }
    tracing::warn!("Canonicalization did not settle after {} passes", MAX_PASSES);
    value
}

fn apply_rules(segment: &str) -> String {
    let mut s = segment.to_string();
    for (regex, replacement) in COMPILED_RULES.iter() {
        let rewritten = match regex.replace_all(&s, NoExpand(replacement)) {
            Cow::Borrowed(_) => None,
            Cow::Owned(rewritten) => Some(rewritten),
        };
        if let Some(rewritten) = rewritten {
            s = rewritten;
        }
    }
    s
}

/// Rewrite the text between `IGN<n>` tokens, leaving the tokens intact
///
/// Tokens are recognized by shape alone, so literal `IGN7` in cell output is
/// protected as well. It canonicalizes to itself on both sides, which keeps
/// comparisons symmetric.
fn outside_tokens(text: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in IGNORE_TOKEN.find_iter(text) {
        out.push_str(&rewrite(&text[last..token.start()]));
        out.push_str(token.as_str());
        last = token.end();
    }
    out.push_str(&rewrite(&text[last..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(c: &Canonicalizer, s: &str) -> String {
        c.canonicalize_text(s)
    }

    #[test]
    fn test_line_endings_and_trailing_newlines() {
        let c = Canonicalizer::default();
        assert_eq!(text(&c, "a\r\nb\r\n\n\n"), "a\nb");
        assert_eq!(text(&c, "a  \n"), "a  ");
    }

    #[test]
    fn test_hex_addresses() {
        let c = Canonicalizer::default();
        assert_eq!(
            text(&c, "<obj at 0x7f3a1b2c3d4e>"),
            text(&c, "<obj at 0x1>")
        );
    }

    #[test]
    fn test_uuids() {
        let c = Canonicalizer::default();
        let a = text(&c, "id: 123e4567-e89b-12d3-a456-426614174000");
        let b = text(&c, "id: 9f1c2d3e-0a1b-4c2d-8e3f-001122334455");
        assert_eq!(a, b);
        assert_eq!(a, "id: U-U-I-D");
    }

    #[test]
    fn test_svg_geometry_and_palette() {
        let c = Canonicalizer::default();
        let old = r##"<polygon fill="black" stroke="transparent" points="0,0 1,1"/><text text-anchor="middle" x="12.5" y="-3">a</text><ellipse fill="#ffffff" stroke="gray"/>"##;
        let new = r##"<polygon stroke="none" points="4,4 2,2"/><text text-anchor="start" x="10" y="-7.25">a</text><ellipse fill="white" stroke="grey"/>"##;
        assert_eq!(text(&c, old), text(&c, new));
    }

    #[test]
    fn test_graphviz_banner() {
        let c = Canonicalizer::default();
        assert_eq!(
            text(&c, "<!-- Generated by graphviz version 2.43.0 (0)\n -->"),
            "<!-- VERSION\n -->"
        );
    }

    #[test]
    fn test_title_split_and_tooltip() {
        let c = Canonicalizer::default();
        assert_eq!(text(&c, "<g><title>a</title>"), "<g>\n<title>a</title>");
        assert_eq!(
            text(&c, "<a xlink:title=\"p0, p1\nand more\">\n<x/>"),
            "<a xlink:title=\"...\">\n<x/>"
        );
    }

    #[test]
    fn test_overwriting_only_at_start() {
        let c = Canonicalizer::default();
        assert_eq!(text(&c, "Overwriting foo.txt"), "Writing foo.txt");
        assert_eq!(text(&c, "x Overwriting foo.txt"), "x Overwriting foo.txt");
    }

    #[test]
    fn test_style_block_removed() {
        let c = Canonicalizer::default();
        assert_eq!(
            text(&c, "<div>\n<style scoped>\n.x { }\n</style>\n<table/></div>"),
            "<div>\n<table/></div>"
        );
    }

    #[test]
    fn test_ignore_patterns_are_positional() {
        let c = Canonicalizer::new(&[r"\d+ ms", r"seed=\w+"]).unwrap();
        assert_eq!(
            text(&c, "took 12 ms with seed=abc"),
            "took IGN0 with IGN1"
        );
        assert_eq!(
            text(&c, "took 9000 ms with seed=zz"),
            "took IGN0 with IGN1"
        );
    }

    #[test]
    fn test_ignore_tokens_are_not_rewritten() {
        // the second pattern would otherwise eat the index of the first token
        let c = Canonicalizer::new(&[r"\d+ ms", r"\d+"]).unwrap();
        let once = text(&c, "12 ms then 7");
        assert_eq!(once, "IGN0 then IGN1");
        assert_eq!(text(&c, &once), once);
    }

    #[test]
    fn test_removal_exposing_earlier_rule_settles() {
        let c = Canonicalizer::default();
        let once = text(&c, "a fill=\"black\"t 0x1f");
        assert_eq!(once, "object");
        assert_eq!(text(&c, &once), once);
    }

    #[test]
    fn test_fixed_rules_leave_tokens_alone() {
        // the token's trailing digit would otherwise complete a UUID
        let c = Canonicalizer::new(&["Q"]).unwrap();
        let once = text(&c, "Q1234567-e89b-12d3-a456-426614174000");
        assert!(once.starts_with("IGN0"), "{}", once);
        assert_eq!(text(&c, &once), once);
    }

    #[test]
    fn test_literal_token_in_output_kept() {
        let c = Canonicalizer::new(&[r"\d"]).unwrap();
        assert_eq!(text(&c, "IGN7 and 3"), "IGN7 and IGN0");
        assert_eq!(text(&Canonicalizer::default(), "IGN7"), "IGN7");
    }

    #[test]
    fn test_invalid_and_empty_patterns() {
        assert!(matches!(
            Canonicalizer::new(&["("]),
            Err(Error::InvalidPattern { .. })
        ));
        let err = Canonicalizer::new(&["x*"]).unwrap_err();
        assert!(err.to_string().contains("empty string"));
    }

    #[test]
    fn test_bookkeeping_dropped() {
        let c = Canonicalizer::default();
        let record = OutputRecord::ExecuteResult {
            data: [("text/plain".to_string(), json!(["4", "2\n"]))].into(),
            metadata: Default::default(),
            execution_count: Some(7),
        };
        assert_eq!(
            c.canonicalize(&record),
            OutputRecord::ExecuteResult {
                data: [("text/plain".to_string(), json!("42"))].into(),
                metadata: Default::default(),
                execution_count: None,
            }
        );

        let error = OutputRecord::Error {
            ename: "ValueError".into(),
            evalue: "bad".into(),
            traceback: vec!["line 1".into()],
        };
        match c.canonicalize(&error) {
            OutputRecord::Error { traceback, .. } => assert!(traceback.is_empty()),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_html_supersedes_plain() {
        let c = Canonicalizer::default();
        let record = OutputRecord::DisplayData {
            data: [
                ("text/html".to_string(), json!("<b>x</b>")),
                ("text/plain".to_string(), json!("<Obj at 0x55d>")),
                ("application/json".to_string(), json!({"k": [1, 2]})),
            ]
            .into(),
            metadata: Default::default(),
            transient: Some(json!({"display_id": "d"})),
        };
        match c.canonicalize(&record) {
            OutputRecord::DisplayData {
                data, transient, ..
            } => {
                assert!(transient.is_none());
                assert_eq!(
                    data.keys().collect::<Vec<_>>(),
                    vec!["application/json", "text/html"]
                );
                assert_eq!(data["application/json"], json!({"k": [1, 2]}));
            }
            other => panic!("Expected DisplayData, got {:?}", other),
        }
    }

    #[test]
    fn test_called_process_error_dot() {
        let c = Canonicalizer::default();
        let record = |evalue: &str| OutputRecord::Error {
            ename: "CalledProcessError".into(),
            evalue: evalue.into(),
            traceback: vec![],
        };
        assert_eq!(
            c.canonicalize(&record("Command 'ls' returned non-zero exit status 2.")),
            c.canonicalize(&record("Command 'ls' returned non-zero exit status 2"))
        );
        // other exceptions keep their punctuation
        let other = OutputRecord::Error {
            ename: "RuntimeError".into(),
            evalue: "Command 'ls' returned non-zero exit status 2.".into(),
            traceback: vec![],
        };
        match c.canonicalize(&other) {
            OutputRecord::Error { evalue, .. } => assert!(evalue.ends_with('.')),
            other => panic!("Expected Error, got {:?}", other),
        }
    }
}
