//! Notebook documents (nbformat v4)
//!
//! Only the parts the harness needs are modelled: the ordered cells, their
//! source, and the outputs stored with each code cell.

mod output;

pub use output::{mime_text, MimeBundle, OutputRecord};

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::common::{Error, Result};

/// Major nbformat version understood by the harness
pub const SUPPORTED_NBFORMAT: u32 = 4;

/// A notebook document
#[derive(Debug, Deserialize)]
pub struct Notebook {
    pub nbformat: u32,
    #[serde(default)]
    pub nbformat_minor: u32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub cells: Vec<Cell>,
}

/// A unit of notebook content
#[derive(Debug, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Code {
        #[serde(deserialize_with = "output::multiline")]
        source: String,
        #[serde(default)]
        outputs: Vec<OutputRecord>,
    },
    Markdown {
        #[serde(deserialize_with = "output::multiline")]
        source: String,
    },
    Raw {
        #[serde(deserialize_with = "output::multiline")]
        source: String,
    },
}

/// A code cell borrowed from a notebook, with its position among all cells
#[derive(Debug, Clone, Copy)]
pub struct CodeCell<'a> {
    pub index: usize,
    pub source: &'a str,
    pub outputs: &'a [OutputRecord],
}

impl Notebook {
    /// Read and parse a notebook file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| match e {
            Error::NotebookParse { error, .. } => Error::NotebookParse {
                path: path.display().to_string(),
                error,
            },
            other => other,
        })
    }

    /// Parse a notebook from its JSON text
    pub fn parse(content: &str) -> Result<Self> {
        let notebook: Self = serde_json::from_str(content).map_err(|e| Error::NotebookParse {
            path: "<memory>".to_string(),
            error: e.to_string(),
        })?;
        if notebook.nbformat != SUPPORTED_NBFORMAT {
            return Err(Error::NotebookParse {
                path: "<memory>".to_string(),
                error: format!(
                    "unsupported nbformat {} (expected {})",
                    notebook.nbformat, SUPPORTED_NBFORMAT
                ),
            });
        }
        Ok(notebook)
    }

    /// Code cells in declaration order
    pub fn code_cells(&self) -> impl Iterator<Item = CodeCell<'_>> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| match cell {
                Cell::Code { source, outputs } => Some(CodeCell {
                    index,
                    source,
                    outputs,
                }),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTEBOOK: &str = r##"{
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"kernelspec": {"name": "python3"}},
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "text"]},
            {
                "cell_type": "code",
                "execution_count": 1,
                "metadata": {},
                "source": ["import sys\n", "print('hi')"],
                "outputs": [{"output_type": "stream", "name": "stdout", "text": ["hi\n"]}]
            },
            {"cell_type": "code", "execution_count": null, "metadata": {}, "source": "", "outputs": []}
        ]
    }"##;

    #[test]
    fn test_parse_notebook() {
        let nb = Notebook::parse(NOTEBOOK).unwrap();
        assert_eq!(nb.cells.len(), 3);
        assert_eq!(nb.nbformat_minor, 5);

        let code: Vec<_> = nb.code_cells().collect();
        assert_eq!(code.len(), 2);
        assert_eq!(code[0].index, 1);
        assert_eq!(code[0].source, "import sys\nprint('hi')");
        assert_eq!(code[0].outputs.len(), 1);
        assert_eq!(code[1].index, 2);
        assert!(code[1].outputs.is_empty());
    }

    #[test]
    fn test_reject_old_format() {
        let err = Notebook::parse(r#"{"nbformat": 3, "cells": []}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported nbformat 3"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ipynb");
        std::fs::write(&path, "{not json").unwrap();
        let err = Notebook::load(&path).unwrap_err();
        match err {
            Error::NotebookParse { path: reported, .. } => {
                assert!(reported.ends_with("broken.ipynb"))
            }
            other => panic!("Expected NotebookParse, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = Notebook::load(Path::new("/nonexistent/nb.ipynb")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
