//! Machine-readable diagnostic output.

use serde::Serialize;
use shapecheck_types::TypeError;

/// One diagnostic as written by `--format json`.
#[derive(Debug, Serialize)]
pub struct DiagnosticRecord {
    pub code: &'static str,
    pub message: String,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&TypeError> for DiagnosticRecord {
    fn from(error: &TypeError) -> Self {
        let span = error.span();
        Self {
            code: error.code_str(),
            message: error.to_string(),
            start: span.start,
            end: span.end,
            expected: error.expected(),
            actual: error.actual().map(str::to_string),
            path: error
                .path()
                .filter(|path| !path.is_root())
                .map(|path| path.to_string()),
        }
    }
}

/// Render diagnostics as a pretty JSON array.
pub fn to_json(errors: &[TypeError]) -> serde_json::Result<String> {
    let records: Vec<DiagnosticRecord> = errors.iter().map(DiagnosticRecord::from).collect();
    serde_json::to_string_pretty(&records)
}
