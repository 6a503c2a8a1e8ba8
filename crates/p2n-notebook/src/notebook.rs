// crates/p2n-notebook/src/notebook.rs
// ============================================================================
// Module: Notebook Document
// Description: Jupyter notebook v4 document model.
// Purpose: Serialize assembled cells into standard notebook JSON.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A minimal Jupyter v4 document: markdown and code cells only, sources
//! stored as line arrays in nbformat style. The model is write-oriented; the
//! executor reads the same shape back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Notebook document errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum NotebookError {
    /// The document failed to parse as a notebook.
    #[error("notebook parse failure: {0}")]
    Parse(String),
    /// The document declares an unsupported format version.
    #[error("unsupported nbformat: {0}")]
    UnsupportedFormat(u32),
    /// The document failed to serialize.
    #[error("notebook serialization failure: {0}")]
    Serialize(String),
}

// ============================================================================
// SECTION: Cells
// ============================================================================

/// A notebook cell.
///
/// # Invariants
/// - `cell_type` is `markdown` or `code`.
/// - `source` lines keep their trailing newlines except the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell type label.
    pub cell_type: String,
    /// Cell metadata; empty by construction.
    pub metadata: Value,
    /// Source lines in nbformat style.
    pub source: Vec<String>,
    /// Execution count for code cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<Value>,
    /// Outputs for code cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Value>>,
}

impl Cell {
    /// Creates a markdown cell from source text.
    #[must_use]
    pub fn markdown(text: &str) -> Self {
        Self {
            cell_type: "markdown".to_string(),
            metadata: json!({}),
            source: split_source(text),
            execution_count: None,
            outputs: None,
        }
    }

    /// Creates a code cell from source text.
    #[must_use]
    pub fn code(text: &str) -> Self {
        Self {
            cell_type: "code".to_string(),
            metadata: json!({}),
            source: split_source(text),
            execution_count: Some(Value::Null),
            outputs: Some(Vec::new()),
        }
    }

    /// Returns the joined source text of the cell.
    #[must_use]
    pub fn source_text(&self) -> String {
        self.source.concat()
    }

    /// Returns true for code cells.
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.cell_type == "code"
    }
}

/// Splits source text into nbformat line entries.
fn split_source(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(position) = rest.find('\n') {
        lines.push(rest[..=position].to_string());
        rest = &rest[position + 1..];
    }
    if !rest.is_empty() {
        lines.push(rest.to_string());
    }
    lines
}

// ============================================================================
// SECTION: Notebook
// ============================================================================

/// A Jupyter v4 notebook document.
///
/// # Invariants
/// - `nbformat` is 4; consumers reject other versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Notebook format major version.
    pub nbformat: u32,
    /// Notebook format minor version.
    pub nbformat_minor: u32,
    /// Notebook metadata.
    pub metadata: Value,
    /// Cells in execution order.
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Creates a notebook from cells with the standard kernel metadata.
    #[must_use]
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            nbformat: 4,
            nbformat_minor: 5,
            metadata: json!({
                "kernelspec": {
                    "display_name": "Python 3",
                    "language": "python",
                    "name": "python3",
                },
                "language_info": { "name": "python" },
            }),
            cells,
        }
    }

    /// Parses a notebook from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError`] when the document does not parse or is not
    /// a v4 notebook.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NotebookError> {
        let notebook: Self = serde_json::from_slice(bytes)
            .map_err(|err| NotebookError::Parse(err.to_string()))?;
        if notebook.nbformat != 4 {
            return Err(NotebookError::UnsupportedFormat(notebook.nbformat));
        }
        Ok(notebook)
    }

    /// Serializes the notebook to pretty JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError::Serialize`]; structurally unreachable for
    /// notebooks built by this crate.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NotebookError> {
        serde_json::to_vec_pretty(self).map_err(|err| NotebookError::Serialize(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
