//! Output records
//!
//! One record per emitted result of a cell: printed text, a rich display
//! payload, or an error. The same type is used for outputs stored in a
//! notebook and outputs collected from a kernel.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// MIME type to payload. Sorted so that rendering is stable.
pub type MimeBundle = BTreeMap<String, Value>;

/// A single output of a code cell, tagged by `output_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputRecord {
    /// Text written to stdout or stderr
    Stream {
        name: String,
        #[serde(deserialize_with = "multiline")]
        text: String,
    },
    /// Rich output produced by a display call
    DisplayData {
        #[serde(default)]
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transient: Option<Value>,
    },
    /// The value of the last expression of a cell
    ExecuteResult {
        #[serde(default)]
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_count: Option<i64>,
    },
    /// An uncaught exception
    Error {
        ename: String,
        evalue: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        traceback: Vec<String>,
    },
}

impl OutputRecord {
    /// Build a record from an iopub message type and its content
    ///
    /// The message type doubles as the `output_type` tag, exactly as it is
    /// stored in a notebook.
    pub fn from_message(msg_type: &str, content: &Value) -> serde_json::Result<Self> {
        let mut object = match content {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        object.insert("output_type".to_string(), Value::String(msg_type.to_string()));
        serde_json::from_value(Value::Object(object))
    }

    /// Short name of the record kind, as used in notebooks
    pub fn output_type(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::DisplayData { .. } => "display_data",
            Self::ExecuteResult { .. } => "execute_result",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this record is the in-notebook request to skip the whole run
    ///
    /// A cell calling `sys.exit(77)` surfaces as a `SystemExit` error whose
    /// value is the exit status.
    pub fn is_skip_signal(&self) -> bool {
        matches!(self, Self::Error { ename, evalue, .. } if ename == "SystemExit" && evalue == "77")
    }
}

/// nbformat stores multi-line strings either whole or as a list of lines
#[derive(Deserialize)]
#[serde(untagged)]
enum MultilineString {
    Whole(String),
    Lines(Vec<String>),
}

impl From<MultilineString> for String {
    fn from(value: MultilineString) -> Self {
        match value {
            MultilineString::Whole(s) => s,
            MultilineString::Lines(lines) => lines.concat(),
        }
    }
}

pub(crate) fn multiline<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    MultilineString::deserialize(deserializer).map(String::from)
}

/// Text of a MIME payload, if it is textual
///
/// JSON MIME types carry structured data and are left alone.
pub fn mime_text(mime: &str, payload: &Value) -> Option<String> {
    if mime.ends_with("json") {
        return None;
    }
    match payload {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str())
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.concat()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_text_as_lines() {
        let record: OutputRecord = serde_json::from_value(json!({
            "output_type": "stream",
            "name": "stdout",
            "text": ["hello\n", "world\n"]
        }))
        .unwrap();
        assert_eq!(
            record,
            OutputRecord::Stream {
                name: "stdout".into(),
                text: "hello\nworld\n".into()
            }
        );
    }

    #[test]
    fn test_from_message_tags_output_type() {
        let record = OutputRecord::from_message(
            "execute_result",
            &json!({
                "execution_count": 3,
                "data": {"text/plain": "42"},
                "metadata": {}
            }),
        )
        .unwrap();
        match record {
            OutputRecord::ExecuteResult {
                data,
                execution_count,
                ..
            } => {
                assert_eq!(execution_count, Some(3));
                assert_eq!(data["text/plain"], json!("42"));
            }
            other => panic!("Expected ExecuteResult, got {:?}", other),
        }
    }

    #[test]
    fn test_from_message_rejects_unknown_type() {
        assert!(OutputRecord::from_message("update_display_data", &json!({})).is_err());
    }

    #[test]
    fn test_skip_signal() {
        let skip = OutputRecord::Error {
            ename: "SystemExit".into(),
            evalue: "77".into(),
            traceback: vec![],
        };
        let other_exit = OutputRecord::Error {
            ename: "SystemExit".into(),
            evalue: "1".into(),
            traceback: vec![],
        };
        assert!(skip.is_skip_signal());
        assert!(!other_exit.is_skip_signal());
    }

    #[test]
    fn test_mime_text() {
        assert_eq!(
            mime_text("text/plain", &json!(["a\n", "b"])).as_deref(),
            Some("a\nb")
        );
        assert_eq!(mime_text("image/svg+xml", &json!("<svg/>")).as_deref(), Some("<svg/>"));
        assert_eq!(mime_text("application/json", &json!(["a", "b"])), None);
        assert_eq!(mime_text("text/plain", &json!(3)), None);
    }
}
